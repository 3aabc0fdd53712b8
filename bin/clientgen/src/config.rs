use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};

/// Configuration of the client generator, env-only like the worker (§6.4): `CG_HOST`,
/// `CG_PORT`, `LB_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CgConfig {
    pub cg_host: String,
    pub cg_port: u16,
    pub lb_url: String,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self { cg_host: "0.0.0.0".into(), cg_port: 8100, lb_url: "http://127.0.0.1:8000".into() }
    }
}

impl CgConfig {
    pub fn load() -> Result<Self, String> {
        Figment::from(figment::providers::Serialized::defaults(CgConfig::default()))
            .merge(Env::raw())
            .extract()
            .map_err(|err| format!("failed to load clientgen config: {err}"))
    }
}

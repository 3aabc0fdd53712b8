use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

pub const LB_CONFIG_FILE_NAME: &str = "pob-lb.toml";

/// Configuration of the load balancer.
///
/// Stored in a TOML file created by the `init` subcommand; may be overridden by `LB_*`
/// environment variables or CLI flags at start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbConfig {
    /// Host the LB listens on.
    pub host: String,
    /// Port the LB listens on.
    pub port: u16,
    /// Worker base URLs. Set via the `WORKER_URLS` env var as a comma-separated list (figment's
    /// `Env` provider only parses `[a,b]`-bracketed arrays, so this is split by hand in
    /// [`LbConfig::load_from_file`] rather than relying on figment's own deserialization).
    pub worker_urls: Vec<String>,
    /// URL of the client generator, for traffic control proxying.
    pub clientgen_url: String,
    /// Maximum time in seconds to wait for a single upstream request.
    pub request_timeout_sec: f64,
    /// Interval between health probe ticks.
    pub health_interval_sec: f64,
    /// How long a worker stays ineligible after a failed forward.
    pub disable_on_fail_sec: f64,
    /// Maximum number of dispatch attempts per request.
    pub retry_attempts: usize,
    /// EWMA smoothing factor for `avg_latency_ms`.
    pub lat_ewma_alpha: f64,
    /// Interval between state-stream frames (floor 0.05s).
    pub stream_interval_sec: f64,
    /// Initial weight mode: `manual` or `auto`.
    pub weight_mode: String,
    /// Interval between auto-weight controller ticks.
    pub auto_weight_interval_sec: f64,
    /// Maximum weight the auto-weight controller will assign.
    pub auto_weight_max: i64,
}

impl Default for LbConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            worker_urls: Vec::new(),
            clientgen_url: "http://127.0.0.1:8100".into(),
            request_timeout_sec: 2.0,
            health_interval_sec: 2.0,
            disable_on_fail_sec: 3.0,
            retry_attempts: 2,
            lat_ewma_alpha: 0.2,
            stream_interval_sec: 0.5,
            weight_mode: "manual".into(),
            auto_weight_interval_sec: 2.0,
            auto_weight_max: 10,
        }
    }
}

impl LbConfig {
    /// Loads the config file from the current directory, layering `LB_*`-prefixed env vars
    /// (host/port/timeouts/retry/weight-mode) and the handful of documented unprefixed vars
    /// (`WORKER_URLS`, `CLIENTGEN_URL`, `AUTO_WEIGHT_INTERVAL_SEC`, `AUTO_WEIGHT_MAX`) on top.
    pub fn load_from_file() -> Result<LbConfig, String> {
        let mut current_dir = std::env::current_dir().map_err(|err| err.to_string())?;
        current_dir.push(LB_CONFIG_FILE_NAME);

        let mut config: LbConfig = Figment::from(Toml::file(&current_dir))
            .merge(Env::prefixed("LB_"))
            .merge(Env::raw().only(&["CLIENTGEN_URL", "AUTO_WEIGHT_INTERVAL_SEC", "AUTO_WEIGHT_MAX"]))
            .extract()
            .map_err(|err| format!("failed to load {} config file: {err}", current_dir.display()))?;

        if let Ok(worker_urls) = std::env::var("WORKER_URLS") {
            config.worker_urls = worker_urls
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::result_large_err)]
    fn load_from_file_binds_prefixed_and_unprefixed_env_vars() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                LB_CONFIG_FILE_NAME,
                "host = \"0.0.0.0\"\nport = 8000\nworker_urls = []\nclientgen_url = \"http://x\"\n\
                 request_timeout_sec = 2.0\nhealth_interval_sec = 2.0\ndisable_on_fail_sec = 3.0\n\
                 retry_attempts = 2\nlat_ewma_alpha = 0.2\nstream_interval_sec = 0.5\n\
                 weight_mode = \"manual\"\nauto_weight_interval_sec = 2.0\nauto_weight_max = 10\n",
            )?;
            jail.set_env("LB_REQUEST_TIMEOUT_SEC", "5.0");
            jail.set_env("LB_RETRY_ATTEMPTS", "4");
            jail.set_env("WORKER_URLS", "http://a:1, http://b:2");
            jail.set_env("CLIENTGEN_URL", "http://clientgen:9000");
            jail.set_env("AUTO_WEIGHT_INTERVAL_SEC", "1.5");
            jail.set_env("AUTO_WEIGHT_MAX", "20");

            let config = LbConfig::load_from_file().expect("config should load");
            assert_eq!(config.request_timeout_sec, 5.0);
            assert_eq!(config.retry_attempts, 4);
            assert_eq!(config.worker_urls, vec!["http://a:1".to_string(), "http://b:2".to_string()]);
            assert_eq!(config.clientgen_url, "http://clientgen:9000");
            assert_eq!(config.auto_weight_interval_sec, 1.5);
            assert_eq!(config.auto_weight_max, 20);
            Ok(())
        });
    }
}

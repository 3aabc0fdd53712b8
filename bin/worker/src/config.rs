use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};

/// Live-patchable configuration of a worker, per §4.7/§6.2.
///
/// Unlike the LB, there is no TOML file for workers in this testbed — they are short-lived
/// processes started directly from `WORKER_*`/`BASE_LAT_MS`-style env vars (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub worker_host: String,
    pub worker_port: u16,
    pub base_lat_ms: i64,
    pub jitter_ms: i64,
    pub capacity: i64,
    pub weight: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".into(),
            worker_host: "0.0.0.0".into(),
            worker_port: 9000,
            base_lat_ms: 20,
            jitter_ms: 5,
            capacity: 50,
            weight: 1,
        }
    }
}

impl WorkerConfig {
    /// Loads defaults layered with bare (unprefixed) env vars: `WORKER_ID`, `WORKER_HOST`,
    /// `WORKER_PORT`, `BASE_LAT_MS`, `JITTER_MS`, `CAPACITY`, `WEIGHT`.
    pub fn load() -> Result<Self, String> {
        Figment::from(figment::providers::Serialized::defaults(WorkerConfig::default()))
            .merge(Env::raw())
            .extract()
            .map_err(|err| format!("failed to load worker config: {err}"))
    }

    /// Applies a partial JSON patch, validating each field's range per §4.7.
    pub fn patch(&mut self, patch: &serde_json::Value) -> Result<(), String> {
        if let Some(v) = patch.get("base_lat_ms") {
            let v = v.as_i64().ok_or("base_lat_ms must be an integer")?;
            if !(0..=60000).contains(&v) {
                return Err("base_lat_ms must be in 0..=60000".into());
            }
            self.base_lat_ms = v;
        }
        if let Some(v) = patch.get("jitter_ms") {
            let v = v.as_i64().ok_or("jitter_ms must be an integer")?;
            if !(0..=60000).contains(&v) {
                return Err("jitter_ms must be in 0..=60000".into());
            }
            self.jitter_ms = v;
        }
        if let Some(v) = patch.get("capacity") {
            let v = v.as_i64().ok_or("capacity must be an integer")?;
            if !(1..=100000).contains(&v) {
                return Err("capacity must be in 1..=100000".into());
            }
            self.capacity = v;
        }
        if let Some(v) = patch.get("weight") {
            let v = v.as_i64().ok_or("weight must be an integer")?;
            if !(1..=1000).contains(&v) {
                return Err("weight must be in 1..=1000".into());
            }
            self.weight = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_rejects_out_of_range_capacity() {
        let mut cfg = WorkerConfig::default();
        let err = cfg.patch(&serde_json::json!({ "capacity": 0 })).unwrap_err();
        assert!(err.contains("capacity"));
    }

    #[test]
    fn patch_applies_valid_fields() {
        let mut cfg = WorkerConfig::default();
        cfg.patch(&serde_json::json!({ "base_lat_ms": 30, "weight": 5 })).unwrap();
        assert_eq!(cfg.base_lat_ms, 30);
        assert_eq!(cfg.weight, 5);
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// WEIGHT MODE
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    Manual,
    Auto,
}

impl WeightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightMode::Manual => "manual",
            WeightMode::Auto => "auto",
        }
    }
}

impl std::str::FromStr for WeightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(WeightMode::Manual),
            "auto" => Ok(WeightMode::Auto),
            other => Err(format!("invalid weight mode: {other}")),
        }
    }
}

// WORKER RECORD
// ================================================================================================

/// Per-worker state tracked by the load balancer.
///
/// All mutations that touch weight fields or `current_weight` must happen under the
/// registry's selector lock (see [crate::LbState::workers]).
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: String,
    /// The host originally derived from `url`, preserved as an alternate lookup key even if
    /// `id` is later overwritten by a `/health` response carrying a `worker_id`.
    pub host_key: String,
    pub url: String,

    pub reported_weight: i64,
    pub manual_weight: Option<i64>,
    pub auto_weight: Option<i64>,
    pub effective_weight: i64,

    pub current_weight: i64,
    pub online: bool,
    pub disabled_until: f64,

    pub assigned: u64,
    pub ok: u64,
    pub fail: u64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
    pub last_seen: f64,
    pub reported_base_lat_ms: Option<i64>,
}

/// Seconds since the Unix epoch, used throughout for `disabled_until`/`expires_at` comparisons.
pub fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

impl WorkerRecord {
    pub fn new(url: String) -> Self {
        let host = host_from_url(&url);
        Self {
            id: host.clone(),
            host_key: host,
            url,
            reported_weight: 1,
            manual_weight: None,
            auto_weight: None,
            effective_weight: 1,
            current_weight: 0,
            online: true,
            disabled_until: 0.0,
            assigned: 0,
            ok: 0,
            fail: 0,
            avg_latency_ms: 0.0,
            last_error: None,
            last_seen: 0.0,
            reported_base_lat_ms: None,
        }
    }

    /// Whether this worker can currently be selected by the WRR selector.
    pub fn eligible(&self) -> bool {
        self.online && self.effective_weight > 0 && now_secs() >= self.disabled_until
    }

    /// Recomputes `effective_weight` from the active mode and any override, per §3 invariants.
    pub fn recompute_effective(&mut self, mode: WeightMode) {
        let w = match mode {
            WeightMode::Manual => self.manual_weight.unwrap_or(self.reported_weight),
            WeightMode::Auto => self.auto_weight.unwrap_or(self.reported_weight),
        };
        self.effective_weight = w.max(1);
    }

    pub fn matches_id(&self, id_or_host: &str) -> bool {
        self.id == id_or_host || self.host_key == id_or_host
    }
}

/// Derives a worker's initial id from its URL's host, stripping scheme and port.
pub fn host_from_url(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").last().unwrap_or(url);
    without_scheme.split(':').next().unwrap_or(without_scheme).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_from_url_strips_scheme_and_port() {
        assert_eq!(host_from_url("http://worker-1:8080"), "worker-1");
        assert_eq!(host_from_url("https://example.com"), "example.com");
    }

    #[test]
    fn effective_weight_follows_mode() {
        let mut w = WorkerRecord::new("http://w1:8000".into());
        w.reported_weight = 5;
        w.manual_weight = Some(3);
        w.auto_weight = Some(7);

        w.recompute_effective(WeightMode::Manual);
        assert_eq!(w.effective_weight, 3);

        w.recompute_effective(WeightMode::Auto);
        assert_eq!(w.effective_weight, 7);

        w.manual_weight = None;
        w.recompute_effective(WeightMode::Manual);
        assert_eq!(w.effective_weight, 5);
    }

    #[test]
    fn effective_weight_is_always_at_least_one() {
        let mut w = WorkerRecord::new("http://w1:8000".into());
        w.manual_weight = Some(0);
        w.recompute_effective(WeightMode::Manual);
        assert_eq!(w.effective_weight, 1);
    }

    #[test]
    fn eligible_requires_online_and_not_disabled() {
        let mut w = WorkerRecord::new("http://w1:8000".into());
        assert!(w.eligible());

        w.online = false;
        assert!(!w.eligible());

        w.online = true;
        w.disabled_until = now_secs() + 60.0;
        assert!(!w.eligible());
    }

    #[test]
    fn matches_id_accepts_registry_id_or_host() {
        let w = WorkerRecord::new("http://worker-1:8080".into());
        assert!(w.matches_id("worker-1"));
        assert!(!w.matches_id("worker-2"));

        let mut w = w;
        w.id = "custom-id".into();
        assert!(w.matches_id("custom-id"));
        assert!(w.matches_id("worker-1"));
    }
}

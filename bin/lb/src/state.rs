use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::LbConfig;
use crate::registry::{WeightMode, WorkerRecord, now_secs};

/// One entry in the bounded dispatch history, kept for operator inspection.
///
/// No reader endpoint is specified for this; it exists so `/experiment/reset` has
/// something besides counters to clear.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub worker_id: String,
    pub status: u16,
    pub latency_ms: f64,
}

const HISTORY_CAPACITY: usize = 256;

/// Shared process state for the load balancer, held in an `Arc` and attached to the
/// `axum::Router` via `with_state`.
pub struct LbState {
    /// The worker vector plus every field the WRR selector and weight recomputation touch.
    /// Held for the duration of a single `choose()` call or weight recompute (§5).
    pub workers: RwLock<Vec<WorkerRecord>>,
    pub weight_mode: RwLock<WeightMode>,
    pub history: RwLock<VecDeque<HistoryEntry>>,
    pub http: reqwest::Client,
    pub config: LbConfig,
}

impl LbState {
    pub fn new(config: LbConfig) -> Arc<Self> {
        let workers = config.worker_urls.iter().cloned().map(WorkerRecord::new).collect();
        let weight_mode =
            config.weight_mode.parse::<WeightMode>().unwrap_or(WeightMode::Manual);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.request_timeout_sec))
            .build()
            .expect("reqwest client builds with static config");

        Arc::new(Self {
            workers: RwLock::new(workers),
            weight_mode: RwLock::new(weight_mode),
            history: RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            http,
            config,
        })
    }

    /// Recomputes `effective_weight` for every worker under the selector mutex, per §4.1.
    pub async fn recompute_all_effective(&self) {
        let mode = *self.weight_mode.read().await;
        let mut workers = self.workers.write().await;
        for w in workers.iter_mut() {
            w.recompute_effective(mode);
        }
    }

    pub async fn push_history(&self, entry: HistoryEntry) {
        let mut history = self.history.write().await;
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// Finds the index of the worker matching `id_or_host` (registry id or derived host).
    pub async fn find_worker_index(&self, id_or_host: &str) -> Option<usize> {
        let workers = self.workers.read().await;
        workers.iter().position(|w| w.matches_id(id_or_host))
    }

    /// Zeroes per-worker counters, `current_weight`, and `disabled_until`; clears the history
    /// buffer. Used by `/experiment/reset` (§4.9).
    pub async fn reset_experiment_state(&self) {
        let mut workers = self.workers.write().await;
        for w in workers.iter_mut() {
            w.assigned = 0;
            w.ok = 0;
            w.fail = 0;
            w.current_weight = 0;
            w.disabled_until = 0.0;
            w.avg_latency_ms = 0.0;
            w.last_error = None;
        }
        drop(workers);
        self.history.write().await.clear();
    }
}

/// Marks a worker as temporarily ineligible and records the failure, per §4.3 step 1.
pub fn record_failure(w: &mut WorkerRecord, err: String, disable_on_fail_secs: f64) {
    w.fail += 1;
    w.last_error = Some(err);
    w.disabled_until = now_secs() + disable_on_fail_secs;
}

/// Folds a forward latency sample into a worker's EWMA, seeding on the first sample (§8 EWMA
/// seeding note: a non-positive running average is replaced, not attenuated).
pub fn record_success(w: &mut WorkerRecord, latency_ms: f64, alpha: f64) {
    w.ok += 1;
    w.last_error = None;
    w.avg_latency_ms = if w.avg_latency_ms <= 0.0 {
        latency_ms
    } else {
        alpha * latency_ms + (1.0 - alpha) * w.avg_latency_ms
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(urls: Vec<&str>) -> LbConfig {
        LbConfig { worker_urls: urls.into_iter().map(String::from).collect(), ..Default::default() }
    }

    #[tokio::test]
    async fn new_state_derives_workers_from_config_urls() {
        let state = LbState::new(cfg(vec!["http://w1:8000", "http://w2:8000"]));
        let workers = state.workers.read().await;
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].host_key, "w1");
        assert_eq!(workers[1].host_key, "w2");
    }

    #[tokio::test]
    async fn find_worker_index_matches_id_or_host() {
        let state = LbState::new(cfg(vec!["http://w1:8000"]));
        assert_eq!(state.find_worker_index("w1").await, Some(0));
        assert_eq!(state.find_worker_index("missing").await, None);
    }

    #[tokio::test]
    async fn reset_experiment_state_zeroes_counters_and_history() {
        let state = LbState::new(cfg(vec!["http://w1:8000"]));
        {
            let mut workers = state.workers.write().await;
            workers[0].assigned = 10;
            workers[0].ok = 8;
            workers[0].fail = 2;
            workers[0].current_weight = 7;
            workers[0].disabled_until = now_secs() + 100.0;
        }
        state
            .push_history(HistoryEntry { worker_id: "w1".into(), status: 200, latency_ms: 1.0 })
            .await;

        state.reset_experiment_state().await;

        let workers = state.workers.read().await;
        assert_eq!(workers[0].assigned, 0);
        assert_eq!(workers[0].ok, 0);
        assert_eq!(workers[0].fail, 0);
        assert_eq!(workers[0].current_weight, 0);
        assert_eq!(workers[0].disabled_until, 0.0);
        assert!(state.history.read().await.is_empty());
    }

    #[test]
    fn record_success_seeds_ewma_then_smooths() {
        let mut w = WorkerRecord::new("http://w1:8000".into());
        record_success(&mut w, 10.0, 0.2);
        assert_eq!(w.avg_latency_ms, 10.0);
        record_success(&mut w, 20.0, 0.2);
        assert!((w.avg_latency_ms - 12.0).abs() < 1e-9);
    }

    #[test]
    fn record_failure_sets_disable_window() {
        let mut w = WorkerRecord::new("http://w1:8000".into());
        let before = now_secs();
        record_failure(&mut w, "boom".into(), 3.0);
        assert_eq!(w.fail, 1);
        assert_eq!(w.last_error.as_deref(), Some("boom"));
        assert!(w.disabled_until >= before + 3.0);
    }
}

use tokio::sync::{Mutex, RwLock};

use crate::config::WorkerConfig;
use crate::faults::FaultRegistry;

/// Per-process counters, guarded separately from `config`/`faults` so the hot `/handle` path
/// only ever holds one small lock at a time and never across `sleep`/network I/O (§5).
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct Counters {
    pub total: u64,
    pub ok: u64,
    pub fail: u64,
    pub inflight: i64,
    pub last_error: Option<String>,
    pub last_simulated_ms: Option<f64>,
}

impl Counters {
    pub fn reset(&mut self) {
        self.total = 0;
        self.ok = 0;
        self.fail = 0;
        self.last_error = None;
        self.last_simulated_ms = None;
        // inflight is a live concurrency gauge, not a cumulative counter; never reset mid-flight.
    }
}

pub struct WorkerState {
    pub config: RwLock<WorkerConfig>,
    pub counters: Mutex<Counters>,
    pub faults: Mutex<FaultRegistry>,
}

impl WorkerState {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            counters: Mutex::new(Counters::default()),
            faults: Mutex::new(FaultRegistry::new()),
        }
    }
}

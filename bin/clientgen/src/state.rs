use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::CgConfig;

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunState {
    pub running: bool,
    pub rps: f64,
    pub endpoint: String,
    pub profile: String,
    pub duration_sec: Option<f64>,
    pub sent: u64,
    pub ok: u64,
    pub fail: u64,
}

pub struct CgState {
    pub run: Mutex<RunState>,
    /// Flipped to request cancellation of the in-flight pacing task; replaced with a fresh
    /// flag on each `/start`. The task's own terminator path is what sets `running = false`.
    pub cancel: Mutex<Option<Arc<AtomicBool>>>,
    pub http: reqwest::Client,
    pub config: CgConfig,
}

impl CgState {
    pub fn new(config: CgConfig) -> Arc<Self> {
        Arc::new(Self {
            run: Mutex::new(RunState::default()),
            cancel: Mutex::new(None),
            http: reqwest::Client::new(),
            config,
        })
    }
}

pub fn new_cancel_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}

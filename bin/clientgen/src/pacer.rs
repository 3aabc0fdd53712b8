use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::state::{CgState, is_cancelled};

/// Paces synthetic load at a constant inter-arrival spacing of `1/rps` against the LB (§4.10).
/// Always sets `running = false` on exit, whether cancelled, expired, or errored — this is the
/// loop's terminator path, not the `/stop` handler's.
pub async fn run(state: Arc<CgState>, cancel: Arc<AtomicBool>) {
    let (rps, endpoint, duration_sec) = {
        let run = state.run.lock().await;
        (run.rps, run.endpoint.clone(), run.duration_sec)
    };

    let interval = Duration::from_secs_f64(1.0 / rps.max(0.001));
    let url = format!("{}{}", state.config.lb_url, endpoint);
    let deadline = duration_sec.map(|d| tokio::time::Instant::now() + Duration::from_secs_f64(d));

    let mut ticker = tokio::time::interval(interval);
    loop {
        if is_cancelled(&cancel) {
            break;
        }
        if let Some(deadline) = deadline {
            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }
        ticker.tick().await;
        if is_cancelled(&cancel) {
            break;
        }

        let resp = state
            .http
            .post(&url)
            .json(&serde_json::json!({ "payload": {} }))
            .send()
            .await;

        let mut run = state.run.lock().await;
        run.sent += 1;
        match resp {
            Ok(r) if r.status().is_success() => run.ok += 1,
            _ => run.fail += 1,
        }
    }

    state.run.lock().await.running = false;
}

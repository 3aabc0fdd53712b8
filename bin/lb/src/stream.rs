use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use serde_json::json;

use crate::registry::now_secs;
use crate::state::LbState;

#[derive(Serialize)]
pub struct WorkerView {
    pub id: String,
    pub url: String,
    pub online: bool,
    pub reported_weight: i64,
    pub manual_weight: Option<i64>,
    pub auto_weight: Option<i64>,
    pub effective_weight: i64,
    pub assigned: u64,
    pub assigned_pct: f64,
    pub ok: u64,
    pub fail: u64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
    pub last_seen: Option<f64>,
}

#[derive(Serialize)]
pub struct StatePayload {
    pub weight_mode: String,
    pub total_assigned: u64,
    pub total_ok: u64,
    pub total_fail: u64,
    pub workers: Vec<WorkerView>,
}

/// Composes a consistent snapshot of the registry for `/state`, `/workers`, and `/stream`
/// frames. Takes the selector lock only long enough to clone the data (§4.6).
pub async fn snapshot(state: &LbState) -> StatePayload {
    let mode = state.weight_mode.read().await.as_str().to_string();
    let workers = state.workers.read().await;

    let total_assigned: u64 = workers.iter().map(|w| w.assigned).sum();
    let total_ok: u64 = workers.iter().map(|w| w.ok).sum();
    let total_fail: u64 = workers.iter().map(|w| w.fail).sum();

    let views = workers
        .iter()
        .map(|w| WorkerView {
            id: w.id.clone(),
            url: w.url.clone(),
            online: w.online,
            reported_weight: w.reported_weight,
            manual_weight: w.manual_weight,
            auto_weight: w.auto_weight,
            effective_weight: w.effective_weight,
            assigned: w.assigned,
            assigned_pct: if total_assigned == 0 {
                0.0
            } else {
                w.assigned as f64 / total_assigned as f64 * 100.0
            },
            ok: w.ok,
            fail: w.fail,
            avg_latency_ms: (w.avg_latency_ms * 100.0).round() / 100.0,
            last_error: w.last_error.clone(),
            last_seen: if w.last_seen == 0.0 { None } else { Some(w.last_seen) },
        })
        .collect();

    StatePayload { weight_mode: mode, total_assigned, total_ok, total_fail, workers: views }
}

/// Drives one `/stream` WebSocket subscriber: pushes a state frame every tick until the
/// client disconnects, then terminates cleanly without affecting other subscribers (§4.6).
pub async fn run_subscriber(mut socket: WebSocket, state: Arc<LbState>) {
    let interval_secs = state.config.stream_interval_sec.max(0.05);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(interval_secs));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = snapshot(&state).await;
                let frame = json!({ "type": "state", "ts": now_secs(), "payload": payload });
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    return;
                }
            }
            msg = socket.recv() => {
                if msg.is_none() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LbConfig;

    #[tokio::test]
    async fn snapshot_computes_assigned_pct_and_totals() {
        let state = LbState::new(LbConfig {
            worker_urls: vec!["http://w1:8000".into(), "http://w2:8000".into()],
            ..Default::default()
        });
        {
            let mut workers = state.workers.write().await;
            workers[0].assigned = 3;
            workers[0].ok = 3;
            workers[1].assigned = 1;
            workers[1].ok = 1;
        }

        let snap = snapshot(&state).await;
        assert_eq!(snap.total_assigned, 4);
        assert_eq!(snap.total_ok, 4);
        assert!((snap.workers[0].assigned_pct - 75.0).abs() < 1e-9);
        assert!((snap.workers[1].assigned_pct - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn snapshot_reports_unset_last_seen_as_none() {
        let state =
            LbState::new(LbConfig { worker_urls: vec!["http://w1:8000".into()], ..Default::default() });
        let snap = snapshot(&state).await;
        assert_eq!(snap.workers[0].last_seen, None);
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use serde_json::{Value, json};

use crate::faults::{self, FiredFaults};
use crate::state::WorkerState;

/// `POST /handle`: the worker's request-handling engine (§4.7). Counters are only ever held
/// under `state.counters` for small synchronous transitions, never across the sleeps/blocking
/// work below.
pub async fn handle(State(state): State<Arc<WorkerState>>, Json(_payload): Json<Value>) -> Response {
    {
        let mut counters = state.counters.lock().await;
        counters.total += 1;
    }

    let active = state.faults.lock().await.snapshot_active();
    let fired = faults::compose(&active);
    let worker_id = state.config.read().await.worker_id.clone();

    if let Some(drop_fault) = &fired.drop {
        if drop_fault.mode == "503" {
            let mut counters = state.counters.lock().await;
            counters.fail += 1;
            counters.last_error = Some("fault_drop_503".into());
            let status =
                StatusCode::from_u16(drop_fault.status_code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            return (status, Json(json!({ "error": "fault_drop_503" }))).into_response();
        }
    }

    if let Some(err) = &fired.error {
        let mut counters = state.counters.lock().await;
        counters.fail += 1;
        counters.last_error = Some(err.message.clone());
        let status = StatusCode::from_u16(err.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            status,
            Json(json!({ "error": err.message, "worker_id": worker_id, "kind": "error" })),
        )
            .into_response();
    }

    let capacity = state.config.read().await.capacity;
    {
        let mut counters = state.counters.lock().await;
        if counters.inflight >= capacity {
            counters.fail += 1;
            counters.last_error = Some("over_capacity".into());
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "over_capacity" })))
                .into_response();
        }
        counters.inflight += 1;
    }

    let response = run_admitted(&state, &worker_id, fired).await;

    {
        let mut counters = state.counters.lock().await;
        counters.inflight = (counters.inflight - 1).max(0);
    }

    response
}

/// Steps 5-10 of §4.7, run only once admission succeeds.
async fn run_admitted(state: &WorkerState, worker_id: &str, fired: FiredFaults) -> Response {
    if fired.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(fired.delay_ms as u64)).await;
    }

    if fired.cpu_burn_ms > 0 {
        let burn_ms = fired.cpu_burn_ms as u64;
        let _ = tokio::task::spawn_blocking(move || {
            let start = std::time::Instant::now();
            while start.elapsed() < Duration::from_millis(burn_ms) {
                std::hint::spin_loop();
            }
        })
        .await;
    }

    if let Some(drop_fault) = &fired.drop {
        if drop_fault.mode == "timeout" {
            tokio::time::sleep(Duration::from_millis(drop_fault.sleep_ms as u64)).await;
            let mut counters = state.counters.lock().await;
            counters.fail += 1;
            counters.last_error = Some("fault_drop_timeout".into());
            return (StatusCode::GATEWAY_TIMEOUT, Json(json!({ "error": "fault_drop_timeout" })))
                .into_response();
        }
    }

    let (base_lat_ms, jitter_ms) = {
        let cfg = state.config.read().await;
        (cfg.base_lat_ms, cfg.jitter_ms)
    };
    let jitter = if jitter_ms > 0 { rand::rng().random_range(0..=jitter_ms) } else { 0 };
    let simulated = base_lat_ms + jitter;
    tokio::time::sleep(Duration::from_millis(simulated.max(0) as u64)).await;

    if let Some(mode) = &fired.corrupt {
        let mut counters = state.counters.lock().await;
        counters.fail += 1;
        counters.last_error = Some("corrupted".into());
        drop(counters);
        return match mode.as_str() {
            "invalid_json" => (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPTED").into_response(),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "worker": worker_id, "msg": "CORRUPTED", "simulated_ms": "NaN" })),
            )
                .into_response(),
        };
    }

    let mut counters = state.counters.lock().await;
    counters.ok += 1;
    counters.last_error = None;
    counters.last_simulated_ms = Some(simulated as f64);
    drop(counters);

    (StatusCode::OK, Json(json!({ "worker_id": worker_id, "message": "handled", "simulated_ms": simulated })))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use axum::body::to_bytes;
    use axum::extract::Json as JsonExtract;

    #[tokio::test]
    async fn handle_returns_ok_with_simulated_ms() {
        let state = Arc::new(WorkerState::new(WorkerConfig {
            base_lat_ms: 1,
            jitter_ms: 0,
            ..Default::default()
        }));
        let resp = handle(State(state), JsonExtract(json!({}))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handle_rejects_over_capacity() {
        let state = Arc::new(WorkerState::new(WorkerConfig { capacity: 1, ..Default::default() }));
        state.counters.lock().await.inflight = 1;
        let resp = handle(State(state), JsonExtract(json!({}))).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn handle_applies_corrupt_fault() {
        let state = Arc::new(WorkerState::new(WorkerConfig {
            base_lat_ms: 0,
            jitter_ms: 0,
            ..Default::default()
        }));
        state
            .faults
            .lock()
            .await
            .add(crate::faults::FaultSpec::Corrupt {
                mode: "invalid_json".into(),
                probability: 1.0,
                duration_sec: None,
            })
            .unwrap();

        let resp = handle(State(state), JsonExtract(json!({}))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"CORRUPTED");
    }
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::error::WorkerError;
use crate::faults::{self, FaultSpec};
use crate::handler;
use crate::state::WorkerState;

pub fn router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config).patch(patch_config))
        .route("/metrics", get(get_metrics))
        .route("/metrics/reset", post(reset_metrics))
        .route("/handle", post(handler::handle))
        .route("/faults", get(list_faults).post(add_fault))
        .route("/faults/{id}", delete(delete_fault))
        .with_state(state)
}

async fn health(State(state): State<Arc<WorkerState>>) -> Json<Value> {
    let cfg = state.config.read().await;
    Json(json!({
        "status": "ok",
        "worker_id": cfg.worker_id,
        "base_lat_ms": cfg.base_lat_ms,
        "jitter_ms": cfg.jitter_ms,
        "capacity": cfg.capacity,
        "weight": cfg.weight,
    }))
}

async fn get_config(State(state): State<Arc<WorkerState>>) -> Json<Value> {
    let cfg = state.config.read().await;
    Json(serde_json::to_value(&*cfg).unwrap())
}

async fn patch_config(
    State(state): State<Arc<WorkerState>>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, WorkerError> {
    let mut cfg = state.config.write().await;
    cfg.patch(&patch).map_err(WorkerError::InvalidConfig)?;
    Ok(Json(serde_json::to_value(&*cfg).unwrap()))
}

async fn get_metrics(State(state): State<Arc<WorkerState>>) -> Json<Value> {
    let counters = state.counters.lock().await;
    Json(serde_json::to_value(&*counters).unwrap())
}

async fn reset_metrics(State(state): State<Arc<WorkerState>>) -> Json<Value> {
    let mut counters = state.counters.lock().await;
    let before = serde_json::to_value(&*counters).unwrap();
    counters.reset();
    let after = serde_json::to_value(&*counters).unwrap();
    Json(json!({ "before": before, "after": after }))
}

async fn list_faults(State(state): State<Arc<WorkerState>>) -> Json<Value> {
    let views = state.faults.lock().await.list();
    Json(Value::Array(views))
}

async fn add_fault(
    State(state): State<Arc<WorkerState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, WorkerError> {
    let spec: FaultSpec = faults::parse_spec(body).map_err(WorkerError::InvalidFaultSpec)?;
    let view = state.faults.lock().await.add(spec).map_err(WorkerError::InvalidFaultSpec)?;
    Ok(Json(view))
}

async fn delete_fault(
    State(state): State<Arc<WorkerState>>,
    Path(id): Path<String>,
) -> Json<Value> {
    let existed = state.faults.lock().await.delete(&id);
    Json(json!({ "deleted": existed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;

    #[tokio::test]
    async fn reset_metrics_zeroes_counters() {
        let state = Arc::new(WorkerState::new(WorkerConfig::default()));
        state.counters.lock().await.total = 5;
        state.counters.lock().await.ok = 5;

        let _ = reset_metrics(State(state.clone())).await;

        let counters = state.counters.lock().await;
        assert_eq!(counters.total, 0);
        assert_eq!(counters.ok, 0);
    }

    #[tokio::test]
    async fn delete_fault_is_idempotent_false_on_second_call() {
        let state = Arc::new(WorkerState::new(WorkerConfig::default()));
        let view = add_fault(
            State(state.clone()),
            Json(json!({ "kind": "cpu_burn", "burn_ms": 1, "probability": 1.0 })),
        )
        .await
        .unwrap();
        let id = view["id"].as_str().unwrap().to_string();

        let first = delete_fault(State(state.clone()), Path(id.clone())).await;
        assert_eq!(first.0["deleted"], json!(true));
        let second = delete_fault(State(state), Path(id)).await;
        assert_eq!(second.0["deleted"], json!(false));
    }
}

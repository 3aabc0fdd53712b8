use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ClientGenError;
use crate::pacer;
use crate::state::{CgState, new_cancel_flag};

pub fn router(state: Arc<CgState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/reset", post(reset))
        .route("/status", get(status))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "clientgen" }))
}

#[derive(Deserialize)]
struct StartBody {
    rps: f64,
    duration_sec: Option<f64>,
    endpoint: String,
    #[serde(default = "default_profile")]
    profile: String,
}

fn default_profile() -> String {
    "constant".into()
}

async fn start(
    State(state): State<Arc<CgState>>,
    Json(body): Json<StartBody>,
) -> Result<Json<Value>, ClientGenError> {
    if body.rps <= 0.0 {
        return Err(ClientGenError::InvalidRequest("rps must be positive".into()));
    }
    if body.profile != "constant" {
        return Err(ClientGenError::InvalidRequest("only the \"constant\" profile is implemented".into()));
    }

    let mut run = state.run.lock().await;
    if run.running {
        return Err(ClientGenError::AlreadyRunning);
    }
    run.running = true;
    run.rps = body.rps;
    run.endpoint = body.endpoint;
    run.profile = body.profile;
    run.duration_sec = body.duration_sec;
    drop(run);

    let cancel = new_cancel_flag();
    *state.cancel.lock().await = Some(cancel.clone());
    tokio::spawn(pacer::run(state.clone(), cancel));

    Ok(Json(json!({ "ok": true })))
}

async fn stop(State(state): State<Arc<CgState>>) -> Json<Value> {
    if let Some(cancel) = state.cancel.lock().await.as_ref() {
        cancel.store(true, Ordering::Relaxed);
    }
    Json(json!({ "ok": true }))
}

async fn reset(State(state): State<Arc<CgState>>) -> Json<Value> {
    if let Some(cancel) = state.cancel.lock().await.as_ref() {
        cancel.store(true, Ordering::Relaxed);
    }
    let mut run = state.run.lock().await;
    run.sent = 0;
    run.ok = 0;
    run.fail = 0;
    Json(json!({ "ok": true }))
}

async fn status(State(state): State<Arc<CgState>>) -> Json<Value> {
    let run = state.run.lock().await;
    Json(serde_json::to_value(&*run).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CgConfig;

    #[tokio::test]
    async fn start_rejects_when_already_running() {
        let state = CgState::new(CgConfig::default());
        state.run.lock().await.running = true;

        let err = start(
            State(state),
            Json(StartBody { rps: 1.0, duration_sec: None, endpoint: "/request".into(), profile: "constant".into() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientGenError::AlreadyRunning));
    }

    #[tokio::test]
    async fn reset_zeroes_counters() {
        let state = CgState::new(CgConfig::default());
        {
            let mut run = state.run.lock().await;
            run.sent = 10;
            run.ok = 9;
            run.fail = 1;
        }
        let _ = reset(State(state.clone())).await;
        let run = state.run.lock().await;
        assert_eq!(run.sent, 0);
        assert_eq!(run.ok, 0);
        assert_eq!(run.fail, 0);
    }
}

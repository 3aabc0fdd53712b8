use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::dispatch;
use crate::error::LbError;
use crate::registry::WeightMode;
use crate::state::LbState;
use crate::stream;

pub fn router(state: Arc<LbState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workers", get(list_workers))
        .route("/state", get(get_state))
        .route("/request", post(request))
        .route("/lb/weight-mode", get(get_weight_mode).post(set_weight_mode))
        .route(
            "/workers/{id}/manual-weight",
            patch(set_manual_weight).delete(clear_manual_weight),
        )
        .route("/workers/{id}/config", get(get_worker_config).patch(patch_worker_config))
        .route("/workers/{id}/metrics", get(get_worker_metrics))
        .route("/workers/{id}/metrics/reset", post(reset_worker_metrics))
        .route(
            "/workers/{id}/faults",
            get(list_worker_faults).post(add_worker_fault),
        )
        .route("/workers/{id}/faults/{fid}", delete(delete_worker_fault))
        .route("/experiment/reset", post(experiment_reset))
        .route("/traffic/start", post(traffic_start))
        .route("/traffic/stop", post(traffic_stop))
        .route("/traffic/status", get(traffic_status))
        .route("/stream", get(stream_upgrade))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "lb" }))
}

async fn list_workers(State(state): State<Arc<LbState>>) -> Json<Value> {
    let snap = stream::snapshot(&state).await;
    Json(serde_json::to_value(snap.workers).unwrap())
}

async fn get_state(State(state): State<Arc<LbState>>) -> Json<Value> {
    let snap = stream::snapshot(&state).await;
    Json(serde_json::to_value(snap).unwrap())
}

#[derive(Deserialize)]
struct RequestBody {
    payload: Value,
}

async fn request(
    State(state): State<Arc<LbState>>,
    Json(body): Json<RequestBody>,
) -> Result<Json<Value>, LbError> {
    let outcome = dispatch::dispatch(&state, body.payload).await?;
    Ok(Json(json!({
        "chosen_worker": outcome.chosen_worker,
        "attempt": outcome.attempt,
        "worker_status": outcome.worker_status,
        "lb_forward_ms": outcome.lb_forward_ms,
        "worker_body": outcome.worker_body,
    })))
}

async fn get_weight_mode(State(state): State<Arc<LbState>>) -> Json<Value> {
    let mode = *state.weight_mode.read().await;
    Json(json!({ "mode": mode.as_str() }))
}

#[derive(Deserialize)]
struct WeightModeBody {
    mode: String,
}

async fn set_weight_mode(
    State(state): State<Arc<LbState>>,
    Json(body): Json<WeightModeBody>,
) -> Result<Json<Value>, LbError> {
    let mode: WeightMode =
        body.mode.parse().map_err(LbError::InvalidRequest)?;
    *state.weight_mode.write().await = mode;
    state.recompute_all_effective().await;
    Ok(Json(json!({ "mode": mode.as_str() })))
}

#[derive(Deserialize)]
struct ManualWeightBody {
    weight: i64,
}

async fn set_manual_weight(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
    Json(body): Json<ManualWeightBody>,
) -> Result<Json<Value>, LbError> {
    if *state.weight_mode.read().await != WeightMode::Manual {
        return Err(LbError::NotInManualMode);
    }
    if !(1..=1000).contains(&body.weight) {
        return Err(LbError::InvalidRequest("weight must be in 1..=1000".into()));
    }
    let mode = *state.weight_mode.read().await;
    let mut workers = state.workers.write().await;
    let idx = workers
        .iter()
        .position(|w| w.matches_id(&id))
        .ok_or_else(|| LbError::WorkerNotFound(id.clone()))?;
    workers[idx].manual_weight = Some(body.weight);
    workers[idx].recompute_effective(mode);
    Ok(Json(json!({ "id": workers[idx].id, "manual_weight": body.weight })))
}

async fn clear_manual_weight(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, LbError> {
    let mode = *state.weight_mode.read().await;
    let mut workers = state.workers.write().await;
    let idx = workers
        .iter()
        .position(|w| w.matches_id(&id))
        .ok_or_else(|| LbError::WorkerNotFound(id.clone()))?;
    workers[idx].manual_weight = None;
    workers[idx].recompute_effective(mode);
    Ok(Json(json!({ "id": workers[idx].id, "manual_weight": Value::Null })))
}

async fn worker_url_for(state: &LbState, id: &str) -> Result<String, LbError> {
    let workers = state.workers.read().await;
    workers
        .iter()
        .find(|w| w.matches_id(id))
        .map(|w| w.url.clone())
        .ok_or_else(|| LbError::WorkerNotFound(id.to_string()))
}

fn upstream_err(worker_id: &str, op: &str, err: impl std::fmt::Display) -> LbError {
    LbError::Upstream { worker_id: worker_id.to_string(), op: op.to_string(), message: err.to_string() }
}

async fn get_worker_config(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .get(format!("{url}/config"))
        .send()
        .await
        .map_err(|e| upstream_err(&id, "get_config", e))?;
    let body: Value =
        resp.json().await.map_err(|e| upstream_err(&id, "get_config", e))?;
    Ok(Json(body))
}

async fn patch_worker_config(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .patch(format!("{url}/config"))
        .json(&body)
        .send()
        .await
        .map_err(|e| upstream_err(&id, "patch_config", e))?;
    let parsed: Value =
        resp.json().await.map_err(|e| upstream_err(&id, "patch_config", e))?;

    let mode = *state.weight_mode.read().await;
    let mut workers = state.workers.write().await;
    if let Some(idx) = workers.iter().position(|w| w.matches_id(&id)) {
        if let Some(weight) = parsed.get("weight").and_then(Value::as_i64) {
            workers[idx].reported_weight = weight.max(1);
            workers[idx].recompute_effective(mode);
        }
        if let Some(base_lat) = parsed.get("base_lat_ms").and_then(Value::as_i64) {
            workers[idx].reported_base_lat_ms = Some(base_lat);
        }
    }
    Ok(Json(parsed))
}

async fn get_worker_metrics(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .get(format!("{url}/metrics"))
        .send()
        .await
        .map_err(|e| upstream_err(&id, "get_metrics", e))?;
    let body: Value =
        resp.json().await.map_err(|e| upstream_err(&id, "get_metrics", e))?;
    Ok(Json(body))
}

async fn reset_worker_metrics(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .post(format!("{url}/metrics/reset"))
        .send()
        .await
        .map_err(|e| upstream_err(&id, "reset_metrics", e))?;
    let body: Value =
        resp.json().await.map_err(|e| upstream_err(&id, "reset_metrics", e))?;
    Ok(Json(body))
}

async fn list_worker_faults(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .get(format!("{url}/faults"))
        .send()
        .await
        .map_err(|e| upstream_err(&id, "list_faults", e))?;
    let body: Value = resp.json().await.map_err(|e| upstream_err(&id, "list_faults", e))?;
    Ok(Json(body))
}

async fn add_worker_fault(
    State(state): State<Arc<LbState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .post(format!("{url}/faults"))
        .json(&body)
        .send()
        .await
        .map_err(|e| upstream_err(&id, "add_fault", e))?;
    let body: Value = resp.json().await.map_err(|e| upstream_err(&id, "add_fault", e))?;
    Ok(Json(body))
}

async fn delete_worker_fault(
    State(state): State<Arc<LbState>>,
    Path((id, fid)): Path<(String, String)>,
) -> Result<Json<Value>, LbError> {
    let url = worker_url_for(&state, &id).await?;
    let resp = state
        .http
        .delete(format!("{url}/faults/{fid}"))
        .send()
        .await
        .map_err(|e| upstream_err(&id, "delete_fault", e))?;
    let body: Value = resp.json().await.map_err(|e| upstream_err(&id, "delete_fault", e))?;
    Ok(Json(body))
}

async fn experiment_reset(State(state): State<Arc<LbState>>) -> Json<Value> {
    let mut results = Vec::new();

    let cg_url = state.config.clientgen_url.clone();
    let stop_ok = state.http.post(format!("{cg_url}/stop")).send().await.is_ok();
    results.push(json!({ "target": "clientgen:stop", "ok": stop_ok }));
    let reset_ok = state.http.post(format!("{cg_url}/reset")).send().await.is_ok();
    results.push(json!({ "target": "clientgen:reset", "ok": reset_ok }));

    let worker_urls: Vec<(String, String)> = {
        let workers = state.workers.read().await;
        workers.iter().map(|w| (w.id.clone(), w.url.clone())).collect()
    };
    for (id, url) in worker_urls {
        let ok = state.http.post(format!("{url}/metrics/reset")).send().await.is_ok();
        results.push(json!({ "target": format!("worker:{id}"), "ok": ok }));
    }

    state.reset_experiment_state().await;

    let overall_ok = results.iter().all(|r| r["ok"].as_bool().unwrap_or(false));
    Json(json!({ "ok": overall_ok, "results": results }))
}

async fn traffic_start(
    State(state): State<Arc<LbState>>,
    Json(body): Json<Value>,
) -> Result<Response, LbError> {
    proxy_clientgen(&state, "start", reqwest::Method::POST, Some(body)).await
}

async fn traffic_stop(State(state): State<Arc<LbState>>) -> Result<Response, LbError> {
    proxy_clientgen(&state, "stop", reqwest::Method::POST, None).await
}

async fn traffic_status(State(state): State<Arc<LbState>>) -> Result<Response, LbError> {
    proxy_clientgen(&state, "status", reqwest::Method::GET, None).await
}

async fn proxy_clientgen(
    state: &LbState,
    op: &str,
    method: reqwest::Method,
    body: Option<Value>,
) -> Result<Response, LbError> {
    let url = format!("{}/{}", state.config.clientgen_url, op);
    let mut req = state.http.request(method, &url);
    if let Some(body) = &body {
        req = req.json(body);
    }
    let resp = req.send().await.map_err(|e| upstream_err("clientgen", op, e))?;
    let value: Value = resp.json().await.map_err(|e| upstream_err("clientgen", op, e))?;
    Ok(Json(value).into_response())
}

async fn stream_upgrade(
    State(state): State<Arc<LbState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream::run_subscriber(socket, state))
}

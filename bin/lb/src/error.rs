use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

// LB ERROR
// ================================================================================================

#[derive(Debug, Error)]
pub enum LbError {
    #[error("no eligible worker")]
    NoEligibleWorker,
    #[error("all attempts failed: {0}")]
    AllAttemptsFailed(String),
    #[error("worker not found: {0}")]
    WorkerNotFound(String),
    #[error("manual_weight can be set only in manual mode")]
    NotInManualMode,
    #[error("upstream error while performing {op} on worker {worker_id}: {message}")]
    Upstream { worker_id: String, op: String, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to bind {1}: {0}")]
    PortAlreadyInUse(#[source] std::io::Error, u16),
    #[error("failed to load config: {0}")]
    ConfigLoad(String),
}

impl IntoResponse for LbError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            LbError::NoEligibleWorker => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "detail": self.to_string() }))
            },
            LbError::AllAttemptsFailed(_) => {
                (StatusCode::BAD_GATEWAY, json!({ "detail": self.to_string() }))
            },
            LbError::WorkerNotFound(_) => {
                (StatusCode::NOT_FOUND, json!({ "detail": self.to_string() }))
            },
            LbError::NotInManualMode => {
                (StatusCode::CONFLICT, json!({ "detail": self.to_string() }))
            },
            LbError::Upstream { worker_id, op, message } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "code": "upstream_error",
                    "worker_id": worker_id,
                    "op": op,
                    "message": message,
                }),
            ),
            LbError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, json!({ "detail": self.to_string() }))
            },
            LbError::PortAlreadyInUse(..) | LbError::ConfigLoad(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": self.to_string() }))
            },
        };
        (status, Json(body)).into_response()
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid fault spec: {0}")]
    InvalidFaultSpec(String),
    #[error("invalid config patch: {0}")]
    InvalidConfig(String),
    #[error("failed to bind {1}: {0}")]
    PortAlreadyInUse(#[source] std::io::Error, u16),
    #[error("failed to load config: {0}")]
    ConfigLoad(String),
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            WorkerError::InvalidFaultSpec(_) | WorkerError::InvalidConfig(_) => {
                (StatusCode::BAD_REQUEST, json!({ "detail": self.to_string() }))
            },
            WorkerError::PortAlreadyInUse(..) | WorkerError::ConfigLoad(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": self.to_string() }))
            },
        };
        (status, Json(body)).into_response()
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientGenError {
    #[error("traffic generator is already running")]
    AlreadyRunning,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to bind {1}: {0}")]
    PortAlreadyInUse(#[source] std::io::Error, u16),
    #[error("failed to load config: {0}")]
    ConfigLoad(String),
}

impl IntoResponse for ClientGenError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ClientGenError::AlreadyRunning => {
                (StatusCode::CONFLICT, json!({ "detail": self.to_string() }))
            },
            ClientGenError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, json!({ "detail": self.to_string() }))
            },
            ClientGenError::PortAlreadyInUse(..) | ClientGenError::ConfigLoad(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": self.to_string() }))
            },
        };
        (status, Json(body)).into_response()
    }
}

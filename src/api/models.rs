//! Wire types for the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::DeviceError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub healthy: bool,
}

/// Body of connect and message responses. `error` is null on success.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DisconnectRequest {}

#[derive(Serialize, Debug, Default)]
pub struct DisconnectResponse {}

/// Everything a handler can fail with
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Request body is not the expected JSON
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Device(err) => err.status_code(),
            ApiError::Decode(_) | ApiError::NoRoute { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::Device(err) => warn!(%status, "Device error: {}", err),
            _ => error!(%status, "Transport error: {}", self),
        }
        let body = ErrorResponse {
            error: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

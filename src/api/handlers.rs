//! HTTP handlers for the device routes
//!
//! Bodies arrive as raw bytes and are decoded here, so a malformed body is
//! reported with the decoder's own message instead of axum's rejection.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::Json;
use serde::de::DeserializeOwned;

use super::models::{
    ApiError, DisconnectRequest, DisconnectResponse, ErrorResponse, HealthResponse,
};
use super::SharedService;
use crate::device::{ConnectRequest, SendMessageRequest};

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

pub async fn health(State(service): State<SharedService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: service.health().await,
    })
}

pub async fn connect(
    State(service): State<SharedService>,
    body: Bytes,
) -> Result<Json<ErrorResponse>, ApiError> {
    let request: ConnectRequest = decode(&body)?;
    service.connect(request).await?;
    Ok(Json(ErrorResponse::default()))
}

/// Accepts an empty body as well as `{}`.
pub async fn disconnect(
    State(service): State<SharedService>,
    body: Bytes,
) -> Result<Json<DisconnectResponse>, ApiError> {
    if !body.iter().all(u8::is_ascii_whitespace) {
        let _: DisconnectRequest = decode(&body)?;
    }
    service.disconnect().await;
    Ok(Json(DisconnectResponse::default()))
}

pub async fn send_message(
    State(service): State<SharedService>,
    body: Bytes,
) -> Result<Json<ErrorResponse>, ApiError> {
    let request: SendMessageRequest = decode(&body)?;
    service.send_message(request).await?;
    Ok(Json(ErrorResponse::default()))
}

pub async fn no_route(method: Method, uri: Uri) -> ApiError {
    ApiError::NoRoute {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

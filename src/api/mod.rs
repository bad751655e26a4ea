//! HTTP transport
//!
//! | Method | Path                    | Body                                    |
//! |--------|-------------------------|-----------------------------------------|
//! | GET    | `/v1/health`            |                                         |
//! | POST   | `/v1/device/connect`    | `authKey`, `authCRT`, `brokerURL`, `clientID` |
//! | POST   | `/v1/device/disconnect` | empty or `{}`                           |
//! | POST   | `/v1/device/message`    | `message`, `topic`                      |
//!
//! Business errors answer with `{"error": "<message>"}` and the status
//! from [`DeviceError::status_code`](crate::error::DeviceError::status_code).
//! Decode failures, unknown paths and unsupported methods on known paths
//! answer 500.

pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use color_eyre::{eyre::eyre, Result};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::device::DeviceService;

pub type SharedService = Arc<dyn DeviceService>;

/// Builds the router. Only `ui_origin` passes CORS.
pub fn router(service: SharedService, ui_origin: &str) -> Result<Router> {
    let origin: HeaderValue = ui_origin
        .parse()
        .map_err(|e| eyre!("Invalid UI origin {:?}: {}", ui_origin, e))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(Router::new()
        .route("/v1/health", get(handlers::health).fallback(handlers::no_route))
        .route(
            "/v1/device/connect",
            post(handlers::connect).fallback(handlers::no_route),
        )
        .route(
            "/v1/device/disconnect",
            post(handlers::disconnect).fallback(handlers::no_route),
        )
        .route(
            "/v1/device/message",
            post(handlers::send_message).fallback(handlers::no_route),
        )
        .fallback(handlers::no_route)
        .layer(middleware::from_fn(short_circuit_options))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service))
}

/// Any OPTIONS request gets an empty 200 without reaching a handler.
async fn short_circuit_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

//! Device service
//!
//! Validates what callers ask the virtual device to do, builds the TLS
//! material for a broker session and hands the actual broker work to the
//! [`DeviceHandle`] worker. Broker failures come back as the opaque
//! [`DeviceError::DeviceAuth`] and [`DeviceError::SendMessage`] kinds.

pub mod device_handle;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeviceError;
use crate::tls::build_tls_config;

pub use device_handle::{DeviceAction, DeviceHandle};

/// Request to open a broker session over mutual TLS
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// PEM-encoded private key
    #[serde(rename = "authKey")]
    pub auth_key: String,
    /// PEM-encoded certificate matching `auth_key`
    #[serde(rename = "authCRT")]
    pub auth_crt: String,
    #[serde(rename = "brokerURL")]
    pub broker_url: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub message: String,
    pub topic: String,
}

/// Operations the gateway offers for its virtual device.
///
/// Implemented by [`Device`] and by the decorators in
/// [`crate::middleware`], which wrap another implementation.
#[async_trait]
pub trait DeviceService: Send + Sync + 'static {
    /// Liveness only; always true.
    async fn health(&self) -> bool;

    async fn connect(&self, request: ConnectRequest) -> Result<(), DeviceError>;

    async fn send_message(&self, request: SendMessageRequest) -> Result<(), DeviceError>;

    /// Closes the broker session if there is one. Never fails.
    async fn disconnect(&self);
}

pub struct Device {
    ca_path: PathBuf,
    handle: DeviceHandle,
}

impl Device {
    pub fn new(ca_path: impl Into<PathBuf>, handle: DeviceHandle) -> Self {
        Self {
            ca_path: ca_path.into(),
            handle,
        }
    }
}

#[async_trait]
impl DeviceService for Device {
    async fn health(&self) -> bool {
        true
    }

    async fn connect(&self, request: ConnectRequest) -> Result<(), DeviceError> {
        if request.broker_url.is_empty() {
            return Err(DeviceError::EmptyBrokerUrl);
        }
        if request.client_id.is_empty() {
            return Err(DeviceError::EmptyClientId);
        }

        let tls = build_tls_config(&self.ca_path, &request.auth_key, &request.auth_crt).await?;
        debug!(broker_url = %request.broker_url, "TLS configuration ready");

        self.handle
            .connect(request.broker_url, request.client_id, tls)
            .await
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<(), DeviceError> {
        if request.topic.is_empty() {
            return Err(DeviceError::EmptyTopic);
        }
        self.handle.send_message(request.message, request.topic).await
    }

    async fn disconnect(&self) {
        self.handle.disconnect().await
    }
}

//! Error definitions for the device gateway
//!
//! Two layers of errors exist:
//!
//! - [`BrokerError`] is what the MQTT adapter reports. It carries the
//!   underlying library error and is only ever logged.
//! - [`DeviceError`] is the closed set of failures the device service
//!   surfaces to HTTP callers. Broker errors are collapsed into it before
//!   they leave the service, so no transport internals reach the API.

use axum::http::StatusCode;
use thiserror::Error;

/// Failures surfaced by the device service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Connect was called without a broker URL
    #[error("invalid empty broker URL")]
    EmptyBrokerUrl,

    /// Connect was called without a client ID
    #[error("invalid empty client ID")]
    EmptyClientId,

    /// SendMessage was called without a topic
    #[error("invalid empty topic")]
    EmptyTopic,

    /// Client key or certificate could not be parsed
    #[error("unable to read client TLS configuration")]
    TlsConfig,

    /// The broker refused or could not be reached with the supplied material
    #[error("error authenticating device")]
    DeviceAuth,

    /// Publishing to the broker failed
    #[error("error sending message")]
    SendMessage,

    /// No broker session is active
    #[error("device is not connected to a broker")]
    NotConnected,

    /// The configured CA file is unreadable or holds no usable certificate
    #[error("unable to read CA certificate")]
    CaCertLoad,
}

impl DeviceError {
    /// HTTP status used when this error is reported by the API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeviceError::TlsConfig | DeviceError::DeviceAuth | DeviceError::SendMessage => {
                StatusCode::BAD_REQUEST
            }
            DeviceError::NotConnected => StatusCode::CONFLICT,
            DeviceError::EmptyBrokerUrl
            | DeviceError::EmptyClientId
            | DeviceError::EmptyTopic
            | DeviceError::CaCertLoad => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failures reported by a [`BrokerClient`](crate::mqtt::BrokerClient)
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker URL could not be parsed or uses an unsupported scheme
    #[error("invalid broker URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Client ID was rejected before dialing
    #[error("invalid client ID: {0}")]
    InvalidClientId(String),

    /// No CONNACK arrived within the connect timeout
    #[error("timed out after {0:?} waiting for the broker")]
    Timeout(std::time::Duration),

    /// Network or protocol failure on the connection
    #[error("connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Request could not be handed to the event loop
    #[error("client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Operation requires an active session
    #[error("no active broker session")]
    NotConnected,

    /// Scripted failure or broker-specific rejection
    #[error("broker rejected request: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_api_contract() {
        assert_eq!(DeviceError::EmptyBrokerUrl.to_string(), "invalid empty broker URL");
        assert_eq!(DeviceError::EmptyClientId.to_string(), "invalid empty client ID");
        assert_eq!(DeviceError::EmptyTopic.to_string(), "invalid empty topic");
        assert_eq!(
            DeviceError::TlsConfig.to_string(),
            "unable to read client TLS configuration"
        );
        assert_eq!(DeviceError::DeviceAuth.to_string(), "error authenticating device");
        assert_eq!(DeviceError::SendMessage.to_string(), "error sending message");
        assert_eq!(DeviceError::CaCertLoad.to_string(), "unable to read CA certificate");
    }

    #[test]
    fn status_codes() {
        assert_eq!(DeviceError::DeviceAuth.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DeviceError::TlsConfig.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DeviceError::SendMessage.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DeviceError::NotConnected.status_code(), StatusCode::CONFLICT);
        for empty in [
            DeviceError::EmptyBrokerUrl,
            DeviceError::EmptyClientId,
            DeviceError::EmptyTopic,
        ] {
            assert_eq!(empty.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{empty}");
        }
        assert_eq!(
            DeviceError::CaCertLoad.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

//! # MQTT Integration Module
//!
//! Everything the virtual device needs to talk to a broker lives here.
//! The rest of the crate only sees the [`BrokerClient`] capability, so the
//! device service can be exercised against [`mock::MockBrokerClient`]
//! without a broker.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Session settings (timeouts, keep-alive, topics)
//! ├── message_manager.rs  - Message representation for logging and tests
//! ├── mqtt_handler.rs     - rumqttc-backed client and its event loop task
//! └── mock.rs             - Recording test double
//! ```
//!
//! ## Connection Lifecycle
//!
//! A client holds at most one session. `connect` dials and waits for the
//! CONNACK, after which a background task keeps polling the rumqttc event
//! loop. The task ends on disconnect or on the first connection error;
//! nothing reconnects automatically.

pub mod config;
pub mod message_manager;
pub mod mock;
pub mod mqtt_handler;

use crate::error::BrokerError;
use async_trait::async_trait;
use rustls::ClientConfig;
use std::sync::Arc;

pub use config::MqttConfig;
pub use message_manager::MqttMessage;
pub use mock::MockBrokerClient;
pub use mqtt_handler::MqttBrokerClient;

/// Connection capability the device service delegates to.
#[async_trait]
pub trait BrokerClient: Send + 'static {
    /// Opens a session to `url` as `client_id`, replacing any previous one.
    async fn connect(
        &mut self,
        url: &str,
        client_id: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<(), BrokerError>;

    /// Closes the current session. Never fails; problems are only logged.
    async fn disconnect(&mut self);

    /// Publishes `message` to `topic` on the current session.
    async fn send_message(&mut self, message: &str, topic: &str) -> Result<(), BrokerError>;
}

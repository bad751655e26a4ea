//! Mock broker client for testing
//!
//! Records every call and answers with scripted results, so the device
//! service and HTTP layer can be tested without a broker. Clones share
//! state: keep one clone for assertions and hand the other to the service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rustls::ClientConfig;
use tokio::sync::Mutex;

use super::message_manager::MqttMessage;
use super::BrokerClient;
use crate::error::BrokerError;

/// Record of a call made to the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect { url: String, client_id: String },
    Disconnect,
    SendMessage { message: String, topic: String },
}

#[derive(Default)]
struct MockState {
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
    calls: Mutex<Vec<MockCall>>,
    sent: Mutex<Vec<MqttMessage>>,
}

#[derive(Clone, Default)]
pub struct MockBrokerClient {
    state: Arc<MockState>,
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent connects fail as if the broker refused them.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent publishes fail.
    pub fn set_fail_send(&self, fail: bool) {
        self.state.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().await.clone()
    }

    /// Messages accepted by `send_message`, oldest first
    pub async fn sent_messages(&self) -> Vec<MqttMessage> {
        self.state.sent.lock().await.clone()
    }

    async fn record(&self, call: MockCall) {
        self.state.calls.lock().await.push(call);
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn connect(
        &mut self,
        url: &str,
        client_id: &str,
        _tls: Arc<ClientConfig>,
    ) -> Result<(), BrokerError> {
        self.record(MockCall::Connect {
            url: url.to_string(),
            client_id: client_id.to_string(),
        })
        .await;

        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(BrokerError::Rejected("mock connect failure".to_string()));
        }
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.record(MockCall::Disconnect).await;
        self.state.connected.store(false, Ordering::SeqCst);
    }

    async fn send_message(&mut self, message: &str, topic: &str) -> Result<(), BrokerError> {
        self.record(MockCall::SendMessage {
            message: message.to_string(),
            topic: topic.to_string(),
        })
        .await;

        if self.state.fail_send.load(Ordering::SeqCst) {
            return Err(BrokerError::Rejected("mock publish failure".to_string()));
        }
        self.state
            .sent
            .lock()
            .await
            .push(MqttMessage::from_topic(topic, message));
        Ok(())
    }
}

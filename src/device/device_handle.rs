//! Device Handle - single owner of the broker session
//!
//! The broker client is not safe to reconfigure concurrently, so it is
//! owned by one worker task. HTTP requests talk to that task through
//! [`DeviceHandle`], which sends a [`DeviceAction`] and waits for the
//! answer on a oneshot channel. Actions are processed strictly one at a
//! time, in arrival order.

use std::sync::Arc;

use rustls::ClientConfig;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::DeviceError;
use crate::mqtt::BrokerClient;

/// Pending actions buffered in front of the worker
const ACTION_CAPACITY: usize = 32;

macro_rules! respond {
    ($response_tx:expr, $result:expr) => {
        if $response_tx.send($result).is_err() {
            warn!("Requester went away before the device answered");
        }
    };
}

#[derive(Debug)]
pub enum DeviceAction {
    Connect {
        broker_url: String,
        client_id: String,
        tls: Arc<ClientConfig>,
        response_tx: oneshot::Sender<Result<(), DeviceError>>,
    },
    SendMessage {
        message: String,
        topic: String,
        response_tx: oneshot::Sender<Result<(), DeviceError>>,
    },
    Disconnect {
        response_tx: oneshot::Sender<()>,
    },
    IsConnected {
        response_tx: oneshot::Sender<bool>,
    },
}

/// Cloneable front end of the device worker
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    tx: mpsc::Sender<DeviceAction>,
}

impl DeviceHandle {
    /// Moves `client` into a new worker task. The worker runs until every
    /// handle is dropped, then closes any open session.
    pub fn spawn<C: BrokerClient>(client: C) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(ACTION_CAPACITY);
        let worker = DeviceWorker {
            client,
            connected: false,
        };
        let worker_handle = tokio::spawn(worker.run(rx));
        (Self { tx }, worker_handle)
    }

    pub async fn connect(
        &self,
        broker_url: String,
        client_id: String,
        tls: Arc<ClientConfig>,
    ) -> Result<(), DeviceError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.dispatch(DeviceAction::Connect {
            broker_url,
            client_id,
            tls,
            response_tx,
        })
        .await
        .ok_or(DeviceError::DeviceAuth)?;
        response_rx.await.unwrap_or(Err(DeviceError::DeviceAuth))
    }

    pub async fn send_message(&self, message: String, topic: String) -> Result<(), DeviceError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.dispatch(DeviceAction::SendMessage {
            message,
            topic,
            response_tx,
        })
        .await
        .ok_or(DeviceError::NotConnected)?;
        response_rx.await.unwrap_or(Err(DeviceError::NotConnected))
    }

    pub async fn disconnect(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .dispatch(DeviceAction::Disconnect { response_tx })
            .await
            .is_some()
            && response_rx.await.is_err()
        {
            warn!("Device worker dropped the disconnect request");
        }
    }

    pub async fn is_connected(&self) -> bool {
        let (response_tx, response_rx) = oneshot::channel();
        match self.dispatch(DeviceAction::IsConnected { response_tx }).await {
            Some(()) => response_rx.await.unwrap_or(false),
            None => false,
        }
    }

    async fn dispatch(&self, action: DeviceAction) -> Option<()> {
        match self.tx.send(action).await {
            Ok(()) => Some(()),
            Err(e) => {
                error!("Device worker is gone: {}", e);
                None
            }
        }
    }
}

struct DeviceWorker<C> {
    client: C,
    connected: bool,
}

impl<C: BrokerClient> DeviceWorker<C> {
    async fn run(mut self, mut rx: mpsc::Receiver<DeviceAction>) {
        debug!("Device worker started");
        while let Some(action) = rx.recv().await {
            match action {
                DeviceAction::Connect {
                    broker_url,
                    client_id,
                    tls,
                    response_tx,
                } => {
                    respond!(response_tx, self.connect(&broker_url, &client_id, tls).await);
                }
                DeviceAction::SendMessage {
                    message,
                    topic,
                    response_tx,
                } => {
                    respond!(response_tx, self.send_message(&message, &topic).await);
                }
                DeviceAction::Disconnect { response_tx } => {
                    respond!(response_tx, self.disconnect().await);
                }
                DeviceAction::IsConnected { response_tx } => {
                    respond!(response_tx, self.connected);
                }
            }
        }

        self.disconnect().await;
        info!("Device worker stopped");
    }

    async fn connect(
        &mut self,
        broker_url: &str,
        client_id: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<(), DeviceError> {
        if self.connected {
            debug!("Replacing the active broker session");
            self.disconnect().await;
        }

        match self.client.connect(broker_url, client_id, tls).await {
            Ok(()) => {
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                warn!(broker_url, client_id, "Device connect failed: {}", e);
                Err(DeviceError::DeviceAuth)
            }
        }
    }

    async fn send_message(&mut self, message: &str, topic: &str) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }

        self.client.send_message(message, topic).await.map_err(|e| {
            warn!(topic, "Device publish failed: {}", e);
            DeviceError::SendMessage
        })
    }

    async fn disconnect(&mut self) {
        if !self.connected {
            debug!("Disconnect requested without an active session");
            return;
        }
        self.client.disconnect().await;
        self.connected = false;
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use rustls::ClientConfig;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::config::MqttConfig;
use super::message_manager::MqttMessage;
use super::BrokerClient;
use crate::error::BrokerError;

/// How long a disconnect waits for the event loop to flush DISCONNECT
const DISCONNECT_QUIESCE: Duration = Duration::from_millis(250);

const DEFAULT_TLS_PORT: u16 = 8883;
const DEFAULT_TCP_PORT: u16 = 1883;

/// Broker endpoint extracted from a connect URL
#[derive(Debug, Clone, PartialEq, Eq)]
struct BrokerAddress {
    host: String,
    port: u16,
    tls: bool,
}

impl BrokerAddress {
    /// Accepts `ssl`, `tls` and `mqtts` for TLS sessions and `tcp` and
    /// `mqtt` for plain ones.
    fn parse(raw: &str) -> Result<Self, BrokerError> {
        let invalid = |reason: String| BrokerError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        let tls = match url.scheme() {
            "ssl" | "tls" | "mqtts" => true,
            "tcp" | "mqtt" => false,
            other => return Err(invalid(format!("unsupported scheme {other}"))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_TCP_PORT });

        Ok(Self { host, port, tls })
    }
}

/// A live broker session
struct Session {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
    url: String,
}

/// rumqttc-backed [`BrokerClient`]
pub struct MqttBrokerClient {
    config: MqttConfig,
    session: Option<Session>,
}

impl MqttBrokerClient {
    pub fn new(config: MqttConfig) -> Self {
        MqttBrokerClient {
            config,
            session: None,
        }
    }

    fn options(
        &self,
        address: &BrokerAddress,
        client_id: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<MqttOptions, BrokerError> {
        // MqttOptions::new panics on these
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(BrokerError::InvalidClientId(client_id.to_string()));
        }

        let mut mqtt_options = MqttOptions::new(client_id, address.host.clone(), address.port);
        mqtt_options
            .set_keep_alive(self.config.keep_alive())
            .set_clean_session(true);
        if address.tls {
            mqtt_options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(tls)));
        }
        Ok(mqtt_options)
    }

    /// Polls until the broker answers the CONNECT.
    async fn await_connack(event_loop: &mut EventLoop) -> Result<(), BrokerError> {
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(BrokerError::Rejected(format!("{code:?}"))),
                    };
                }
                event => trace!(?event, "Event before CONNACK"),
            }
        }
    }

    async fn subscribe_configured(&self, client: &AsyncClient) {
        for topic in &self.config.subscribe_topics {
            match client.subscribe(topic.as_str(), QoS::AtMostOnce).await {
                Ok(()) => info!(topic = %topic, "Subscribed"),
                Err(e) => warn!(topic = %topic, "Subscription failed: {}", e),
            }
        }
    }
}

/// Keeps the session alive after CONNACK and logs inbound traffic.
async fn drive_event_loop(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                info!("Received {}", MqttMessage::from_publish(&publish));
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent, stopping event loop");
                break;
            }
            Ok(event) => trace!(?event, "MQTT event"),
            Err(e) => {
                error!("MQTT connection lost: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl BrokerClient for MqttBrokerClient {
    async fn connect(
        &mut self,
        url: &str,
        client_id: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<(), BrokerError> {
        if self.session.is_some() {
            self.disconnect().await;
        }

        let address = BrokerAddress::parse(url)?;
        let mqtt_options = self.options(&address, client_id, tls)?;

        let (client, mut event_loop) =
            AsyncClient::new(mqtt_options, self.config.request_capacity.max(1));

        let timeout = self.config.connect_timeout();
        let result = match tokio::time::timeout(timeout, Self::await_connack(&mut event_loop)).await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(timeout)),
        };

        if let Err(e) = result {
            error!(url = %url, "Could not connect with MQTT broker: {}", e);
            return Err(e);
        }

        info!(url = %url, client_id = %client_id, "Client connected with MQTT broker");

        let event_loop = tokio::spawn(drive_event_loop(event_loop));
        self.subscribe_configured(&client).await;
        self.session = Some(Session {
            client,
            event_loop,
            url: url.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("Disconnect without an active session");
            return;
        };

        if let Err(e) = session.client.disconnect().await {
            warn!(url = %session.url, "Could not request disconnect: {}", e);
        }

        let mut event_loop = session.event_loop;
        if tokio::time::timeout(DISCONNECT_QUIESCE, &mut event_loop)
            .await
            .is_err()
        {
            debug!("Event loop did not stop in time, aborting");
            event_loop.abort();
        }

        info!(url = %session.url, "Client disconnected from MQTT broker");
    }

    async fn send_message(&mut self, message: &str, topic: &str) -> Result<(), BrokerError> {
        let session = self.session.as_ref().ok_or(BrokerError::NotConnected)?;

        if let Err(e) = session
            .client
            .publish(topic, QoS::AtMostOnce, false, message.as_bytes().to_vec())
            .await
        {
            error!(topic = %topic, "Could not send message to MQTT broker: {}", e);
            return Err(e.into());
        }

        info!(topic = %topic, "Message successfully sent to MQTT broker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls() -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth(),
        )
    }

    #[test]
    fn parses_tls_schemes() {
        let address = BrokerAddress::parse("ssl://mosquitto:1883").unwrap();
        assert_eq!(
            address,
            BrokerAddress {
                host: "mosquitto".to_string(),
                port: 1883,
                tls: true
            }
        );
        assert_eq!(BrokerAddress::parse("mqtts://broker").unwrap().port, 8883);
        assert!(!BrokerAddress::parse("tcp://broker").unwrap().tls);
        assert_eq!(BrokerAddress::parse("mqtt://broker").unwrap().port, 1883);
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            BrokerAddress::parse("thisIsNotAURL"),
            Err(BrokerError::InvalidUrl { .. })
        ));
        assert!(matches!(
            BrokerAddress::parse("http://broker:80"),
            Err(BrokerError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn empty_client_id_is_rejected() {
        let mut client = MqttBrokerClient::new(MqttConfig::default());
        let result = client.connect("ssl://127.0.0.1:8883", "", tls()).await;
        assert!(matches!(result, Err(BrokerError::InvalidClientId(_))));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_connect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = MqttBrokerClient::new(MqttConfig {
            connect_timeout_secs: 2,
            ..Default::default()
        });
        let url = format!("tcp://127.0.0.1:{port}");
        assert!(client.connect(&url, "device", tls()).await.is_err());
        assert!(client.session.is_none());
    }

    #[tokio::test]
    async fn send_without_session() {
        let mut client = MqttBrokerClient::new(MqttConfig::default());
        let result = client.send_message("hello", "devices/a").await;
        assert!(matches!(result, Err(BrokerError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_noop() {
        let mut client = MqttBrokerClient::new(MqttConfig::default());
        client.disconnect().await;
        assert!(client.session.is_none());
    }
}

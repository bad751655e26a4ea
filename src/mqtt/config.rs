use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest keep-alive rumqttc accepts without panicking
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Settings applied to every broker session the device opens.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    /// Upper bound for dialing the broker and receiving CONNACK
    pub connect_timeout_secs: u64,
    /// MQTT keep-alive interval
    pub keep_alive_secs: u64,
    /// Capacity of the request queue between client and event loop
    pub request_capacity: usize,
    /// Topics subscribed right after a successful connect
    pub subscribe_topics: Vec<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            keep_alive_secs: 60,
            request_capacity: 100,
            subscribe_topics: Vec::new(),
        }
    }
}

impl MqttConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS))
    }
}

use chrono::NaiveDateTime;
use std::fmt;

/// A message seen on a broker session, outbound or inbound.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

/// Characters of content shown by the `Display` impl
const PREVIEW_LEN: usize = 32;

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(PREVIEW_LEN).collect();
        if preview.len() < self.content.len() {
            write!(f, "{} - {}: {}...", self.timestamp, self.topic, preview)
        } else {
            write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
        }
    }
}

impl MqttMessage {
    pub fn from_topic(topic: impl Into<String>, content: impl Into<String>) -> Self {
        MqttMessage {
            topic: topic.into(),
            content: content.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    /// Builds a message from an inbound publish. Non-UTF-8 payloads are
    /// replaced lossily.
    pub fn from_publish(publish: &rumqttc::Publish) -> Self {
        Self::from_topic(
            publish.topic.clone(),
            String::from_utf8_lossy(&publish.payload).into_owned(),
        )
    }
}

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker connection settings
///
/// Mirrors the `[mqtt]` section of the configuration file. Credentials are
/// only sent when both `username` and `password` are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,

    /// Delivery level for publishes (0, 1 or 2)
    pub qos: u8,

    /// Publish with the retain flag so late subscribers see the last value
    pub retain: bool,

    pub keep_alive_secs: u64,

    /// Upper bound for one connect attempt including CONNACK
    pub connect_timeout_ms: u64,

    /// Upper bound for flushing one publish (and its ack for QoS > 0)
    pub publish_timeout_ms: u64,

    /// Pause between background reconnect attempts
    pub reconnect_delay_ms: u64,

    /// Capacity of the request queue in front of the connection actor
    pub queue_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "http2mqtt".to_string(),
            qos: 0,
            retain: true,
            keep_alive_secs: 30,
            connect_timeout_ms: 3000,
            publish_timeout_ms: 3000,
            reconnect_delay_ms: 5000,
            queue_capacity: 100,
        }
    }
}

impl MqttConfig {
    /// Returns `None` for QoS values outside 0..=2
    pub fn qos(&self) -> Option<QoS> {
        match self.qos {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pw)) => Some((user.as_str(), pw.as_str())),
            _ => None,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Longest a caller waits for a publish: one reconnect plus one publish
    pub fn request_deadline(&self) -> Duration {
        self.connect_timeout() + self.publish_timeout()
    }

    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

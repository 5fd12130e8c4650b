use chrono::NaiveDateTime;
use std::fmt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::PublishError;

/// Message queued for the broker
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MQTTMessage {
    pub topic: String,
    pub payload: String,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {}: {}", self.timestamp, self.topic, self.payload)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: String, payload: String) -> Self {
        MQTTMessage {
            topic,
            payload,
            timestamp: chrono::Local::now().naive_local(),
        }
    }
}

/// Commands accepted by the connection actor
#[derive(Debug)]
pub enum BrokerAction {
    Publish {
        message: MQTTMessage,
        /// The actor answers before this instant; the requester waits a
        /// little longer than that
        deadline: Instant,
        response_tx: oneshot::Sender<Result<(), PublishError>>,
    },
}

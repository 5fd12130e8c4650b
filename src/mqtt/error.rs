//! Error types of the broker connection

use rumqttc::{ConnectReturnCode, ConnectionError};
use std::time::Duration;
use thiserror::Error;

/// Failure to establish a broker session
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Broker host name could not be resolved to an address
    #[error("Cannot resolve broker address {addr}: {reason}")]
    Resolve { addr: String, reason: String },

    /// Broker answered CONNECT with a non-success return code
    #[error("Broker refused connection: {0:?}")]
    Refused(ConnectReturnCode),

    /// Network or protocol failure while connecting
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("No CONNACK within {0:?}")]
    Timeout(Duration),
}

/// Failure of a single publish attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// No session could be established, or it broke during the publish
    #[error("Broker unavailable")]
    BrokerUnavailable,

    /// The client or broker refused the publish itself
    #[error("Broker rejected publish: {0}")]
    BrokerRejected(String),
}

//! # MQTT Broker Connection
//!
//! Owns the single long-lived session to the configured broker and serializes
//! every publish over it.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and their defaults
//! ├── error.rs            - Connect and publish failures
//! ├── message_manager.rs  - Queued messages and actor commands
//! └── mqtt_handler.rs     - Connection actor, reconnect loop and handle
//! ```
//!
//! ## Failure Model
//!
//! - Connection problems are never fatal. A publish on a broken session
//!   reports [`PublishError::BrokerUnavailable`] and the actor keeps retrying
//!   in the background on a fixed delay.
//! - Only an unresolvable broker host at startup stops the process; see
//!   [`mqtt_handler::resolve_broker`].
//! - Every connect and publish is bounded by a timeout, so an HTTP request
//!   waiting on the broker always gets an answer.

pub mod config;
pub mod error;
pub mod message_manager;
pub mod mqtt_handler;


pub use config::MqttConfig;
pub use error::{ConnectError, PublishError};
pub use mqtt_handler::{ConnectionState, MQTTHandle, MQTTStatus};

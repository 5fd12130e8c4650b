//! Relay subsystem: one HTTP request in, at most one MQTT publish out
//!
//! 1. [`pipeline`] - per-request state machine (split, decode, validate, publish)
//! 2. [`handler`] - entry point used by the HTTP layer, plus the [`Publisher`] seam
//! 3. [`outcome`] - result classification and its HTTP status
//!
//! No retries happen here: each HTTP call is exactly one publish attempt and
//! the caller decides whether to try again.

pub mod handler;
pub mod outcome;
pub mod pipeline;


pub use handler::{Publisher, RelayHandler};
pub use outcome::PublishOutcome;

use crate::validation::{MessagePolicy, TopicPolicy};

/// Topic and message policy, fixed for the lifetime of the process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayPolicy {
    pub topics: TopicPolicy,
    pub messages: MessagePolicy,
}

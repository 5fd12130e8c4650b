//! Topic and message validation
//!
//! Pure checks applied to every decoded request before anything reaches the
//! broker:
//!
//! 1. [`topic`] - format rules, whitelist lookup and prefixing
//! 2. [`message`] - length bound and allowed character set
//!
//! ```text
//! raw topic ──► validate_topic ──► ValidatedTopic (prefix + topic)
//! raw msg   ──► validate_message ─► ValidatedMessage (unchanged)
//! ```
//!
//! Both validators are total: malformed input is an expected outcome and is
//! reported through [`RejectReason`], never through a panic.

pub mod message;
pub mod topic;


pub use message::{validate_message, MessagePolicy, ValidatedMessage};
pub use topic::{validate_topic, TopicPolicy, ValidatedTopic};

/// Reason a request was refused before publishing
///
/// Every variant maps to `400 Bad Request` at the HTTP boundary. The display
/// text is sent back to the caller as the response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Path did not have the `/{topic}/{message}` shape
    #[error("malformed path")]
    MalformedPath,

    /// A path segment did not percent-decode to valid UTF-8
    #[error("decode error")]
    DecodeError,

    #[error("empty topic")]
    EmptyTopic,

    #[error("topic contains whitespace")]
    TopicWhitespace,

    /// Topic contains a character outside printable ASCII
    #[error("topic contains non-printable character {0:?}")]
    TopicNotPrintable(char),

    /// Whitelist is configured and the topic is not on it
    #[error("topic {0:?} is not allowed")]
    TopicNotAllowed(String),

    /// Empty payload while the message policy forbids it
    #[error("empty message")]
    EmptyMessage,

    #[error("message length {length} exceeds maximum of {max}")]
    MessageTooLong { length: usize, max: usize },

    /// Message contains a character outside the allowed set
    #[error("message contains disallowed character {0:?}")]
    MessageCharacter(char),
}

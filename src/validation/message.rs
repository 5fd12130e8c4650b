//! Message length and character rules

use serde::{Deserialize, Serialize};
use std::fmt;

use super::RejectReason;

/// Punctuation always accepted in a message besides letters, digits and space
pub const BASE_PUNCTUATION: &str = ".()-_";

pub const DEFAULT_MAX_LENGTH: usize = 100;

/// Limits applied to message payloads
///
/// The allowed character set is ASCII letters, ASCII digits, space and
/// [`BASE_PUNCTUATION`], extended by `extra_chars`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagePolicy {
    /// Maximum number of characters
    pub max_length: usize,

    /// Additional characters accepted on top of the base set
    pub extra_chars: String,

    /// Whether an empty message may be published
    pub allow_empty: bool,
}

impl Default for MessagePolicy {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            extra_chars: String::new(),
            allow_empty: true,
        }
    }
}

impl MessagePolicy {
    pub fn allows_char(&self, c: char) -> bool {
        c.is_ascii_alphanumeric()
            || c == ' '
            || BASE_PUNCTUATION.contains(c)
            || self.extra_chars.contains(c)
    }
}

/// Message that passed validation; the content is never altered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage(String);

impl ValidatedMessage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks a decoded message against the message policy
///
/// Length is counted in characters. Checks run in order: empty, length,
/// character set, so an overlong message is reported as too long even if it
/// also contains disallowed characters.
pub fn validate_message(
    message: &str,
    policy: &MessagePolicy,
) -> Result<ValidatedMessage, RejectReason> {
    if message.is_empty() && !policy.allow_empty {
        return Err(RejectReason::EmptyMessage);
    }

    let length = message.chars().count();
    if length > policy.max_length {
        return Err(RejectReason::MessageTooLong {
            length,
            max: policy.max_length,
        });
    }

    if let Some(c) = message.chars().find(|c| !policy.allows_char(*c)) {
        return Err(RejectReason::MessageCharacter(c));
    }

    Ok(ValidatedMessage(message.to_string()))
}

//! Topic format rules and whitelist policy

use serde::{Deserialize, Serialize};
use std::fmt;

use super::RejectReason;

/// Topics accepted for publishing and the prefix put in front of them
///
/// Loaded once at startup from the `[topics]` section of the configuration.
/// An empty whitelist means every well-formed topic is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicPolicy {
    /// Allowed topics, matched exactly and case-sensitively
    pub whitelist: Vec<String>,

    /// Prepended to the accepted topic before publishing (e.g. `home/`)
    pub prefix: String,
}

impl TopicPolicy {
    pub fn is_restricted(&self) -> bool {
        !self.whitelist.is_empty()
    }

    fn allows(&self, topic: &str) -> bool {
        !self.is_restricted() || self.whitelist.iter().any(|allowed| allowed == topic)
    }
}

/// Topic that passed validation, already carrying the configured prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTopic(String);

impl ValidatedTopic {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks a decoded topic against format rules and the whitelist
///
/// The whitelist is consulted with the raw topic, the prefix is only applied
/// to the returned value.
///
/// # Errors
///
/// * [`RejectReason::EmptyTopic`] - topic is empty
/// * [`RejectReason::TopicWhitespace`] - topic contains any whitespace
/// * [`RejectReason::TopicNotPrintable`] - topic contains a non printable or non ASCII character
/// * [`RejectReason::TopicNotAllowed`] - whitelist is set and does not contain the topic
pub fn validate_topic(topic: &str, policy: &TopicPolicy) -> Result<ValidatedTopic, RejectReason> {
    if topic.is_empty() {
        return Err(RejectReason::EmptyTopic);
    }

    if topic.chars().any(char::is_whitespace) {
        return Err(RejectReason::TopicWhitespace);
    }

    if let Some(c) = topic.chars().find(|c| !c.is_ascii_graphic()) {
        return Err(RejectReason::TopicNotPrintable(c));
    }

    if !policy.allows(topic) {
        return Err(RejectReason::TopicNotAllowed(topic.to_string()));
    }

    Ok(ValidatedTopic(format!("{}{}", policy.prefix, topic)))
}

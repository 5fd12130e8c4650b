//! Per-request relay pipeline as a typestate machine
//!
//! ```text
//! Received ─split→ Decoding ─decode→ Validating ─validate→ Publishing ─publish→ Completed
//!     │               │                  │
//!     └───────────────┴──────────────────┴──────── reject ──────────────────────→ Completed
//! ```
//!
//! Every failing step short-circuits to `Completed` carrying the outcome.
//! Nothing is shared between requests, so only the publish step touches
//! shared state (through the [`Publisher`]).

use tracing::debug;

use super::handler::Publisher;
use super::outcome::PublishOutcome;
use super::RelayPolicy;
use crate::validation::{
    validate_message, validate_topic, RejectReason, ValidatedMessage, ValidatedTopic,
};

/// Topic and message that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub topic: ValidatedTopic,
    pub message: ValidatedMessage,
}

/// Stage of a [`RelayRequest`]; `Data` is what the stage carries
pub trait RelayStage {
    type Data;
}

#[derive(Debug, Clone)]
pub struct Received;
#[derive(Debug, Clone)]
pub struct Decoding;
#[derive(Debug, Clone)]
pub struct Validating;
#[derive(Debug, Clone)]
pub struct Publishing;
#[derive(Debug, Clone)]
pub struct Completed;

impl RelayStage for Received {
    type Data = ();
}
impl RelayStage for Decoding {
    type Data = ();
}
impl RelayStage for Validating {
    type Data = ();
}
impl RelayStage for Publishing {
    type Data = ValidatedRequest;
}
impl RelayStage for Completed {
    type Data = PublishOutcome;
}

pub struct RelayRequest<S: RelayStage> {
    raw_path: String,
    // Segments are still percent-encoded until the Decoding step ran
    topic: String,
    message: String,
    state_data: S::Data,
}

impl<S: RelayStage> RelayRequest<S> {
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    pub fn get_state_data(&self) -> &S::Data {
        &self.state_data
    }

    fn transition<N: RelayStage<Data = ()>>(self) -> RelayRequest<N> {
        self.transition_with(())
    }

    fn transition_with<N: RelayStage>(self, data: N::Data) -> RelayRequest<N> {
        RelayRequest {
            raw_path: self.raw_path,
            topic: self.topic,
            message: self.message,
            state_data: data,
        }
    }

    fn complete(self, outcome: PublishOutcome) -> RelayRequest<Completed> {
        self.transition_with(outcome)
    }

    fn reject(self, reason: RejectReason) -> RelayRequest<Completed> {
        debug!("Rejecting {}: {}", self.raw_path, reason);
        self.complete(reason.into())
    }
}

impl RelayRequest<Received> {
    pub fn receive(raw_path: &str) -> Self {
        RelayRequest {
            raw_path: raw_path.to_string(),
            topic: String::new(),
            message: String::new(),
            state_data: (),
        }
    }

    /// Splits `/{topic}/{message}`; any other segment count is malformed
    pub fn split(mut self) -> Result<RelayRequest<Decoding>, RelayRequest<Completed>> {
        let segments: Vec<String> = match self.raw_path.strip_prefix('/') {
            Some(path) => path.split('/').map(str::to_string).collect(),
            None => Vec::new(),
        };

        if segments.len() != 2 {
            debug!(
                "Unexpected request format; expected 2 path segments, got {}",
                segments.len()
            );
            return Err(self.reject(RejectReason::MalformedPath));
        }

        let mut segments = segments.into_iter();
        self.topic = segments.next().unwrap_or_default();
        self.message = segments.next().unwrap_or_default();
        Ok(self.transition())
    }
}

impl RelayRequest<Decoding> {
    /// Percent-decodes both segments; `%2F` in a segment becomes `/`
    pub fn decode(mut self) -> Result<RelayRequest<Validating>, RelayRequest<Completed>> {
        let decoded = urlencoding::decode(&self.topic)
            .map(|t| t.into_owned())
            .and_then(|topic| {
                urlencoding::decode(&self.message).map(|m| (topic, m.into_owned()))
            });

        match decoded {
            Ok((topic, message)) => {
                debug!("Topic   = {}", topic);
                debug!("Message = {}", message);
                self.topic = topic;
                self.message = message;
                Ok(self.transition())
            }
            Err(e) => {
                debug!("Percent-decoding failed: {}", e);
                Err(self.reject(RejectReason::DecodeError))
            }
        }
    }
}

impl RelayRequest<Validating> {
    /// Validates topic first, then message
    pub fn validate(
        self,
        policy: &RelayPolicy,
    ) -> Result<RelayRequest<Publishing>, RelayRequest<Completed>> {
        let topic = match validate_topic(&self.topic, &policy.topics) {
            Ok(topic) => topic,
            Err(reason) => return Err(self.reject(reason)),
        };
        let message = match validate_message(&self.message, &policy.messages) {
            Ok(message) => message,
            Err(reason) => return Err(self.reject(reason)),
        };

        Ok(self.transition_with(ValidatedRequest { topic, message }))
    }
}

impl RelayRequest<Publishing> {
    /// Exactly one publish attempt; failures are not retried here
    pub async fn publish<P: Publisher>(self, publisher: &P) -> RelayRequest<Completed> {
        let ValidatedRequest { topic, message } = self.get_state_data().clone();
        let (topic, message) = (topic.into_inner(), message.into_inner());

        debug!("Publishing to {} ({} bytes)", topic, message.len());
        let outcome = match publisher.publish(&topic, &message).await {
            Ok(()) => PublishOutcome::Published,
            Err(e) => e.into(),
        };
        self.complete(outcome)
    }
}

impl RelayRequest<Completed> {
    pub fn outcome(&self) -> PublishOutcome {
        self.get_state_data().clone()
    }
}

/// Runs one request through the whole pipeline
pub async fn relay<P: Publisher>(
    raw_path: &str,
    policy: &RelayPolicy,
    publisher: &P,
) -> PublishOutcome {
    let prepared = RelayRequest::<Received>::receive(raw_path)
        .split()
        .and_then(|request| request.decode())
        .and_then(|request| request.validate(policy));

    let completed = match prepared {
        Ok(publishing) => publishing.publish(publisher).await,
        Err(completed) => completed,
    };
    completed.outcome()
}

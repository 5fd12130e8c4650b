use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::mqtt::PublishError;
use crate::validation::RejectReason;

/// Result classification of one relay attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    ValidationRejected(RejectReason),
    BrokerUnavailable,
    BrokerRejected(String),
}

impl PublishOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PublishOutcome::Published => StatusCode::OK,
            PublishOutcome::ValidationRejected(_) => StatusCode::BAD_REQUEST,
            PublishOutcome::BrokerUnavailable | PublishOutcome::BrokerRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Short plain-text body returned alongside the status
    pub fn body(&self) -> String {
        match self {
            PublishOutcome::Published => "OK".to_string(),
            PublishOutcome::ValidationRejected(reason) => format!("ERROR: {}", reason),
            PublishOutcome::BrokerUnavailable => "ERROR: MQTT broker unavailable".to_string(),
            PublishOutcome::BrokerRejected(_) => "ERROR: MQTT broker rejected message".to_string(),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published)
    }
}

impl From<RejectReason> for PublishOutcome {
    fn from(reason: RejectReason) -> Self {
        PublishOutcome::ValidationRejected(reason)
    }
}

impl From<PublishError> for PublishOutcome {
    fn from(error: PublishError) -> Self {
        match error {
            PublishError::BrokerUnavailable => PublishOutcome::BrokerUnavailable,
            PublishError::BrokerRejected(reason) => PublishOutcome::BrokerRejected(reason),
        }
    }
}

impl IntoResponse for PublishOutcome {
    fn into_response(self) -> Response {
        (self.status_code(), self.body()).into_response()
    }
}

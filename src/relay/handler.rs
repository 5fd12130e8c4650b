use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use super::outcome::PublishOutcome;
use super::pipeline::relay;
use super::RelayPolicy;
use crate::mqtt::{MQTTHandle, PublishError};

/// Seam between the relay and the broker connection
pub trait Publisher: Clone + Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl Publisher for MQTTHandle {
    fn publish(
        &self,
        topic: &str,
        payload: &str,
    ) -> impl Future<Output = Result<(), PublishError>> + Send {
        MQTTHandle::publish(self, topic, payload)
    }
}

/// Orchestrates one request end to end
///
/// Cheap to clone; the policy is shared behind an `Arc` and the publisher is
/// itself a handle.
#[derive(Clone)]
pub struct RelayHandler<P> {
    policy: Arc<RelayPolicy>,
    publisher: P,
}

impl<P: Publisher> RelayHandler<P> {
    pub fn new(policy: RelayPolicy, publisher: P) -> Self {
        Self {
            policy: Arc::new(policy),
            publisher,
        }
    }

    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    pub async fn handle(&self, raw_path: &str) -> PublishOutcome {
        info!("Handling new HTTP request {}", raw_path);
        let outcome = relay(raw_path, &self.policy, &self.publisher).await;

        match &outcome {
            PublishOutcome::Published => info!("Relayed {}", raw_path),
            PublishOutcome::ValidationRejected(reason) => {
                info!("Rejected {}: {}", raw_path, reason)
            }
            PublishOutcome::BrokerUnavailable => {
                warn!("Broker unavailable while relaying {}", raw_path)
            }
            PublishOutcome::BrokerRejected(reason) => {
                warn!("Broker rejected {}: {}", raw_path, reason)
            }
        }
        outcome
    }
}

// ============================================================================
// Event Bus Client
// ============================================================================
//
// Publish/subscribe over an external broker addressed by (bus, topic).
// Delivery is at-least-once: a handler may see the same payload again after
// it asked for a retry, after a crash, or after a redeploy.
//
// ============================================================================

pub mod event;
mod memory;
mod redpanda;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kameo::actor::ActorRef;
use tokio::task::JoinHandle;

use crate::actors::{AddToDlq, DeadLetterActor};
use crate::errors::{BusError, ProcessError};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, CircuitState, IsTransient, RetryConfig, RetryResult};

pub use event::{EventKind, OrderEvent};
pub use memory::InMemoryEventBus;
pub use redpanda::RedpandaEventBus;

/// One delivery of a payload to a handler
#[derive(Debug, Clone)]
pub struct Delivery {
    pub bus: String,
    pub topic: String,
    pub payload: Vec<u8>,
    /// 1 for the first delivery, incremented on every redelivery
    pub attempt: u32,
}

impl Delivery {
    pub fn new(bus: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            bus: bus.into(),
            topic: topic.into(),
            payload,
            attempt: 1,
        }
    }

    fn redelivered(&self, attempt: u32) -> Self {
        Self { attempt, ..self.clone() }
    }
}

/// A handler's verdict on one delivery. This is the only channel through
/// which retry intent reaches the broker.
#[derive(Debug)]
pub enum Disposition {
    /// Processed, or nothing left to do
    Ack,
    /// Transient failure before anything durable happened; deliver again
    Retry(ProcessError),
    /// Permanent failure; redelivery cannot help
    Reject(ProcessError),
}

impl Disposition {
    /// The `(retry, error)` pair of the bus contract
    pub fn into_retry_pair(self) -> (bool, Option<ProcessError>) {
        match self {
            Disposition::Ack => (false, None),
            Disposition::Retry(e) => (true, Some(e)),
            Disposition::Reject(e) => (false, Some(e)),
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Retry(_) => "retry",
            Disposition::Reject(_) => "reject",
        }
    }

    fn into_result(self) -> Result<(), Refusal> {
        match self.into_retry_pair() {
            (_, None) => Ok(()),
            (retry, Some(error)) => Err(Refusal { retry, error }),
        }
    }
}

#[derive(Debug)]
struct Refusal {
    retry: bool,
    error: ProcessError,
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl IsTransient for Refusal {
    fn is_transient(&self) -> bool {
        self.retry
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> Disposition;
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub bus: String,
    pub topic: String,
    /// Consumer group; instances sharing it split the topic between them
    pub group: String,
}

/// Running subscription; dropping it leaves the consumer running
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }

    /// Wait for the consumer loop to end
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, bus: &str, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, BusError>;

    /// Publish circuit state, for transports that guard the broker with one
    async fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}

// ============================================================================
// Redelivery
// ============================================================================

/// How a transport treats `Retry` and `Reject` dispositions
#[derive(Clone)]
pub struct DeliveryPolicy {
    pub redelivery: RetryConfig,
    pub dead_letters: Option<ActorRef<DeadLetterActor>>,
    pub metrics: Arc<Metrics>,
}

impl DeliveryPolicy {
    pub fn new(redelivery: RetryConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            redelivery,
            dead_letters: None,
            metrics,
        }
    }

    pub fn with_dead_letters(mut self, dead_letters: ActorRef<DeadLetterActor>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }
}

/// Final fate of a payload once the transport stops delivering it
#[derive(Debug, PartialEq, Eq)]
pub enum Settlement {
    Acked { attempts: u32 },
    DeadLettered { attempts: u32, reason: String },
}

/// Hand `delivery` to `handler`, redelivering on `Retry` with backoff until
/// the policy is exhausted. Rejected or exhausted payloads are dead-lettered;
/// either way the transport may then acknowledge the message.
pub async fn deliver(
    handler: &dyn EventHandler,
    delivery: Delivery,
    policy: &DeliveryPolicy,
) -> Settlement {
    let first_attempt_at = Utc::now();
    let mut attempts = 0;

    let result = retry_on_transient(policy.redelivery.clone(), |attempt| {
        attempts = attempt;
        let delivery = delivery.redelivered(attempt);
        let metrics = policy.metrics.clone();
        async move {
            if attempt > 1 {
                metrics.record_redelivery(&delivery.topic);
            }
            handler.handle(delivery).await.into_result()
        }
    })
    .await;

    let refusal = match result {
        RetryResult::Success(()) => return Settlement::Acked { attempts },
        RetryResult::Failed(refusal) | RetryResult::PermanentFailure(refusal) => refusal,
    };

    let reason = refusal.error.to_string();
    tracing::error!(
        bus = %delivery.bus,
        topic = %delivery.topic,
        attempts,
        retryable = refusal.retry,
        error = %reason,
        "Giving up on delivery, dead-lettering payload"
    );
    policy.metrics.record_dead_letter(&delivery.topic);

    match &policy.dead_letters {
        Some(dlq) => {
            let letter = AddToDlq {
                bus: delivery.bus.clone(),
                topic: delivery.topic.clone(),
                payload: delivery.payload.clone(),
                error_message: reason.clone(),
                failure_count: attempts,
                first_failed_at: first_attempt_at,
            };
            if dlq.tell(letter).await.is_err() {
                tracing::error!(
                    topic = %delivery.topic,
                    "Dead letter actor unavailable, payload dropped"
                );
            }
        }
        None => {
            tracing::warn!(
                topic = %delivery.topic,
                "No dead letter queue configured, payload dropped"
            );
        }
    }

    Settlement::DeadLettered { attempts, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Scripted {
        calls: AtomicU32,
        retries_before_ack: u32,
        reject: bool,
    }

    #[async_trait]
    impl EventHandler for Scripted {
        async fn handle(&self, delivery: Delivery) -> Disposition {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(delivery.attempt, call);
            if self.reject {
                Disposition::Reject(ProcessError::MalformedPayload("bad".into()))
            } else if call <= self.retries_before_ack {
                Disposition::Retry(ProcessError::DeadlineExceeded(Duration::from_millis(1)))
            } else {
                Disposition::Ack
            }
        }
    }

    fn policy(max: u32) -> DeliveryPolicy {
        let mut redelivery = RetryConfig::redelivery(max);
        redelivery.initial_delay = Duration::from_millis(1);
        redelivery.max_delay = Duration::from_millis(2);
        DeliveryPolicy::new(redelivery, Arc::new(Metrics::new().unwrap()))
    }

    fn scripted(retries_before_ack: u32, reject: bool) -> Scripted {
        Scripted { calls: AtomicU32::new(0), retries_before_ack, reject }
    }

    #[test]
    fn test_retry_pair_contract() {
        assert!(matches!(Disposition::Ack.into_retry_pair(), (false, None)));
        let deadline = ProcessError::DeadlineExceeded(Duration::from_secs(1));
        let (retry, err) = Disposition::Retry(deadline).into_retry_pair();
        assert!(retry && err.is_some());
        let unknown = ProcessError::UnknownOrder("x".into());
        let (retry, err) = Disposition::Reject(unknown).into_retry_pair();
        assert!(!retry && err.is_some());
    }

    #[tokio::test]
    async fn test_retry_is_redelivered_until_ack() {
        let handler = scripted(2, false);
        let delivery = Delivery::new("bus", "orders", b"order-1".to_vec());
        let settled = deliver(&handler, delivery, &policy(5)).await;

        assert_eq!(settled, Settlement::Acked { attempts: 3 });
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reject_is_never_redelivered() {
        let handler = scripted(0, true);
        let delivery = Delivery::new("bus", "orders", b"{}".to_vec());
        let settled = deliver(&handler, delivery, &policy(5)).await;

        assert!(matches!(settled, Settlement::DeadLettered { attempts: 1, .. }));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_dead_lettered() {
        let handler = scripted(u32::MAX, false);
        let p = policy(3);
        let delivery = Delivery::new("bus", "orders", b"order-1".to_vec());
        let settled = deliver(&handler, delivery, &p).await;

        assert!(matches!(settled, Settlement::DeadLettered { attempts: 3, .. }));
        let gathered = p.metrics.registry().gather();
        let dead = gathered.iter().find(|m| m.name() == "dlq_messages_total").unwrap();
        assert_eq!(dead.metric[0].counter.value, Some(1.0));
    }
}

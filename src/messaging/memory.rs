use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};

use super::{
    deliver, Delivery, DeliveryPolicy, EventBus, EventHandler, Subscription, SubscriptionHandle,
};
use crate::errors::BusError;

/// In-process event bus.
///
/// Every consumer group subscribed to a (bus, topic) gets each payload once;
/// members of the same group take turns. Each delivery runs on its own task
/// and goes through the shared redelivery policy, so handlers see the same
/// at-least-once behaviour as with a real broker.
pub struct InMemoryEventBus {
    policy: DeliveryPolicy,
    topics: RwLock<HashMap<(String, String), Vec<Group>>>,
    published: Mutex<Vec<PublishedEvent>>,
    failing_publishes: AtomicU32,
    in_flight: Arc<InFlight>,
}

struct Group {
    name: String,
    members: Vec<mpsc::UnboundedSender<Delivery>>,
    next: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub bus: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl InMemoryEventBus {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            policy,
            topics: RwLock::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            failing_publishes: AtomicU32::new(0),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// The next `n` publishes fail with `BusError::PublishFailed`
    pub fn fail_next_publishes(&self, n: u32) {
        self.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Every payload accepted so far, in publish order
    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().await.clone()
    }

    /// Resolves once every accepted delivery has been acked or dead-lettered
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, bus: &str, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let injected = self
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BusError::PublishFailed {
                bus: bus.to_string(),
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        self.published.lock().await.push(PublishedEvent {
            bus: bus.to_string(),
            topic: topic.to_string(),
            payload: payload.clone(),
        });

        let mut topics = self.topics.write().await;
        let Some(groups) = topics.get_mut(&(bus.to_string(), topic.to_string())) else {
            tracing::debug!(bus = %bus, topic = %topic, "Published with no subscribers");
            return Ok(());
        };

        for group in groups.iter_mut() {
            group.members.retain(|member| !member.is_closed());
            if group.members.is_empty() {
                continue;
            }

            let member = &group.members[group.next % group.members.len()];
            group.next = group.next.wrapping_add(1);

            self.in_flight.start();
            if member.send(Delivery::new(bus, topic, payload.clone())).is_err() {
                self.in_flight.finish();
                tracing::warn!(
                    group = %group.name,
                    topic = %topic,
                    "Subscriber went away before delivery"
                );
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, BusError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        {
            let mut topics = self.topics.write().await;
            let groups = topics
                .entry((subscription.bus.clone(), subscription.topic.clone()))
                .or_default();
            match groups.iter_mut().find(|g| g.name == subscription.group) {
                Some(group) => group.members.push(tx),
                None => groups.push(Group {
                    name: subscription.group.clone(),
                    members: vec![tx],
                    next: 0,
                }),
            }
        }

        tracing::info!(
            bus = %subscription.bus,
            topic = %subscription.topic,
            group = %subscription.group,
            "Subscribed to in-memory topic"
        );

        let policy = self.policy.clone();
        let in_flight = self.in_flight.clone();
        let task = tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let handler = handler.clone();
                let policy = policy.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    deliver(handler.as_ref(), delivery, &policy).await;
                    in_flight.finish();
                });
            }
        });

        Ok(SubscriptionHandle::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessError;
    use crate::messaging::Disposition;
    use crate::metrics::Metrics;
    use crate::utils::RetryConfig;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Vec<u8>, u32)>>,
        retry_first: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, delivery: Delivery) -> Disposition {
            self.seen.lock().await.push((delivery.payload.clone(), delivery.attempt));
            if self.retry_first && delivery.attempt == 1 {
                Disposition::Retry(ProcessError::DeadlineExceeded(Duration::from_millis(1)))
            } else {
                Disposition::Ack
            }
        }
    }

    fn bus() -> InMemoryEventBus {
        let mut redelivery = RetryConfig::redelivery(3);
        redelivery.initial_delay = Duration::from_millis(1);
        InMemoryEventBus::new(DeliveryPolicy::new(redelivery, Arc::new(Metrics::new().unwrap())))
    }

    fn subscription(group: &str) -> Subscription {
        Subscription {
            bus: "orders-pubsub".into(),
            topic: "orders".into(),
            group: group.into(),
        }
    }

    #[tokio::test]
    async fn test_each_group_receives_every_payload() {
        let bus = bus();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        bus.subscribe(subscription("a"), a.clone()).await.unwrap();
        bus.subscribe(subscription("b"), b.clone()).await.unwrap();

        bus.publish("orders-pubsub", "orders", b"order-1".to_vec()).await.unwrap();
        bus.publish("orders-pubsub", "other", b"order-2".to_vec()).await.unwrap();
        bus.wait_idle().await;

        assert_eq!(a.seen.lock().await.clone(), vec![(b"order-1".to_vec(), 1)]);
        assert_eq!(b.seen.lock().await.len(), 1);
        assert_eq!(bus.published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_group_members_share_the_topic() {
        let bus = bus();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.subscribe(subscription("proc"), first.clone()).await.unwrap();
        bus.subscribe(subscription("proc"), second.clone()).await.unwrap();

        for id in ["order-1", "order-2"] {
            bus.publish("orders-pubsub", "orders", id.as_bytes().to_vec()).await.unwrap();
        }
        bus.wait_idle().await;

        assert_eq!(first.seen.lock().await.len(), 1);
        assert_eq!(second.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_triggers_redelivery() {
        let bus = bus();
        let handler = Arc::new(Recorder { retry_first: true, ..Default::default() });
        bus.subscribe(subscription("proc"), handler.clone()).await.unwrap();

        bus.publish("orders-pubsub", "orders", b"order-1".to_vec()).await.unwrap();
        bus.wait_idle().await;

        let attempts: Vec<u32> = handler.seen.lock().await.iter().map(|(_, a)| *a).collect();
        assert_eq!(attempts, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let bus = bus();
        bus.fail_next_publishes(1);

        let err = bus.publish("orders-pubsub", "orders", b"order-1".to_vec()).await.unwrap_err();
        assert!(matches!(err, BusError::PublishFailed { .. }));
        assert!(bus.published().await.is_empty());
        assert!(bus.publish("orders-pubsub", "orders", b"order-1".to_vec()).await.is_ok());
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::{
    deliver, Delivery, DeliveryPolicy, EventBus, EventHandler, Settlement, Subscription,
    SubscriptionHandle,
};
use crate::errors::BusError;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

/// Kafka-protocol event bus (Redpanda, Kafka).
///
/// `name` is the logical bus name services address; it maps to one broker
/// cluster. Publishing is guarded by a circuit breaker. Consumers commit an
/// offset only after the payload was acked or dead-lettered, and handle
/// messages one at a time so a commit never skips an unfinished offset.
pub struct RedpandaEventBus {
    name: String,
    brokers: String,
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    policy: DeliveryPolicy,
}

impl RedpandaEventBus {
    pub fn connect(name: &str, brokers: &str, policy: DeliveryPolicy) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| anyhow::anyhow!("failed to create producer for {brokers}: {e}"))?;

        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 3,
        });

        tracing::info!(bus = %name, brokers = %brokers, "Event bus producer created");

        Ok(Self {
            name: name.to_string(),
            brokers: brokers.to_string(),
            producer,
            circuit_breaker,
            policy,
        })
    }

    fn check_bus(&self, bus: &str) -> Result<(), BusError> {
        if bus == self.name {
            Ok(())
        } else {
            Err(BusError::UnknownBus(bus.to_string()))
        }
    }
}

#[async_trait]
impl EventBus for RedpandaEventBus {
    async fn publish(&self, bus: &str, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.check_bus(bus)?;

        let result = self
            .circuit_breaker
            .call(async {
                // Keyed by the payload (the order id) so one order stays on one partition
                let record = FutureRecord::to(topic).key(&payload).payload(&payload);
                self.producer
                    .send(record, Timeout::After(Duration::from_secs(5)))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e)
            })
            .await;

        let state = self.circuit_breaker.state().await;
        self.policy.metrics.update_circuit_breaker_state(state);

        match result {
            Ok(()) => {
                tracing::info!(bus = %bus, topic = %topic, "Published event");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    bus = %bus,
                    topic = %topic,
                    "Circuit breaker open, broker unavailable"
                );
                Err(BusError::CircuitOpen {
                    bus: bus.to_string(),
                    topic: topic.to_string(),
                })
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(bus = %bus, topic = %topic, error = %e, "Failed to publish event");
                Err(BusError::PublishFailed {
                    bus: bus.to_string(),
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionHandle, BusError> {
        self.check_bus(&subscription.bus)?;

        let failed = |reason: String| BusError::SubscriptionFailed {
            bus: subscription.bus.clone(),
            topic: subscription.topic.clone(),
            reason,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &subscription.group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| failed(format!("failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[subscription.topic.as_str()])
            .map_err(|e| failed(format!("failed to subscribe: {e}")))?;

        tracing::info!(
            bus = %subscription.bus,
            topic = %subscription.topic,
            group = %subscription.group,
            "Subscribed to topic"
        );

        let policy = self.policy.clone();
        let task = tokio::spawn(async move {
            let mut stream = consumer.stream();

            while let Some(received) = stream.next().await {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            topic = %subscription.topic,
                            "Failed to receive message"
                        );
                        continue;
                    }
                };

                let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                let delivery = Delivery::new(subscription.bus.clone(), message.topic(), payload);

                tracing::debug!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    "Event received"
                );

                match deliver(handler.as_ref(), delivery, &policy).await {
                    Settlement::Acked { attempts } => {
                        tracing::debug!(offset = message.offset(), attempts, "Event acked");
                    }
                    Settlement::DeadLettered { attempts, .. } => {
                        tracing::warn!(offset = message.offset(), attempts, "Event dead-lettered");
                    }
                }

                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                    tracing::warn!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        error = %e,
                        "Failed to commit offset, event may be redelivered"
                    );
                }
            }

            tracing::info!(topic = %subscription.topic, "Consumer stream ended");
        });

        Ok(SubscriptionHandle::new(task))
    }

    async fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.circuit_breaker.state().await)
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CompletionMode, Config};
use crate::errors::{BusError, OrderError};
use crate::ids::IdGenerator;
use crate::messaging::{EventBus, OrderEvent};
use crate::metrics::Metrics;
use crate::models::{Order, OrderReceipt};
use crate::state::StateStore;

// ============================================================================
// Intake Service
// ============================================================================
//
// decode → mint id → persist → publish → receipt
//
// The id is minted before anything is written. If the put fails the id is
// simply dropped; the order does not exist. If the put succeeds but the
// publish fails or times out the order stays "received" forever
// (consistency gap): the caller gets an error and the gap is counted and
// logged with the id.
//
// Each remote step gets its own deadline so a stalled publish is still
// reported as a gap rather than a retryable timeout.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub state_store: String,
    pub pubsub: String,
    pub topic: String,
    pub completion: CompletionMode,
    /// Budget for each remote step of a request
    pub deadline: Duration,
}

impl From<&Config> for IntakeSettings {
    fn from(config: &Config) -> Self {
        Self {
            state_store: config.state_store.clone(),
            pubsub: config.pubsub.clone(),
            topic: config.topic.clone(),
            completion: config.completion,
            deadline: config.request_timeout,
        }
    }
}

pub struct IntakeService {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn EventBus>,
    ids: Arc<dyn IdGenerator>,
    metrics: Arc<Metrics>,
    settings: IntakeSettings,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn StateStore>,
        bus: Arc<dyn EventBus>,
        ids: Arc<dyn IdGenerator>,
        metrics: Arc<Metrics>,
        settings: IntakeSettings,
    ) -> Self {
        tracing::info!(
            store = %settings.state_store,
            pubsub = %settings.pubsub,
            topic = %settings.topic,
            id_strategy = ids.strategy(),
            completion = ?settings.completion,
            "Intake service configured"
        );

        Self { store, bus, ids, metrics, settings }
    }

    /// Accept a new order from its raw JSON body
    pub async fn create_order(&self, raw: &[u8]) -> Result<OrderReceipt, OrderError> {
        let result = self.intake(raw).await;

        if let Err(e) = &result {
            self.metrics.record_intake_failure(e.kind());
            tracing::error!(kind = e.kind().as_str(), error = %e, "Order intake failed");
        }
        result
    }

    async fn intake(&self, raw: &[u8]) -> Result<OrderReceipt, OrderError> {
        let request = Order::from_request(raw).map_err(OrderError::InvalidInput)?;

        let order_id = self
            .within("id generation", self.ids.next_id())
            .await?
            .map_err(OrderError::IdGeneration)?;
        self.metrics.record_id(self.ids.strategy());

        let completed = self.settings.completion == CompletionMode::Immediate;
        let order = request.accept(order_id.clone(), completed);
        tracing::info!(order_id = %order_id, items = order.items.len(), "Order received");

        let record = serde_json::to_vec(&order).map_err(|source| OrderError::Encode {
            order_id: order_id.clone(),
            source,
        })?;

        let put = self.store.put(&self.settings.state_store, &order_id, record);
        if let Err(source) = self.within("persist order", put).await? {
            tracing::warn!(order_id = %order_id, "Order not persisted, discarding its id");
            return Err(OrderError::Persist { order_id, source });
        }
        self.metrics.orders_received.inc();

        if self.settings.completion == CompletionMode::Event {
            tracing::debug!(
                order_id = %order_id,
                pubsub = %self.settings.pubsub,
                topic = %self.settings.topic,
                "Publishing order event"
            );

            let event = OrderEvent::received(order_id.as_str());
            let publish = self
                .bus
                .publish(&self.settings.pubsub, &self.settings.topic, event.encode());
            let published = match tokio::time::timeout(self.settings.deadline, publish).await {
                Ok(published) => published,
                Err(_) => Err(BusError::Timeout {
                    bus: self.settings.pubsub.clone(),
                    topic: self.settings.topic.clone(),
                    after: self.settings.deadline,
                }),
            };
            if let Err(source) = published {
                tracing::error!(
                    order_id = %order_id,
                    "Order persisted but never published, it needs operator intervention"
                );
                return Err(OrderError::Publish { order_id, source });
            }
        }

        Ok(OrderReceipt::received(order_id))
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        step: impl Future<Output = T>,
    ) -> Result<T, OrderError> {
        tokio::time::timeout(self.settings.deadline, step)
            .await
            .map_err(|_| OrderError::DeadlineExceeded { operation })
    }

    /// Stored record bytes, exactly as persisted
    pub async fn get_order_raw(&self, order_id: &str) -> Result<Vec<u8>, OrderError> {
        let lookup = self.store.get(&self.settings.state_store, order_id);

        match self.within("get order", lookup).await? {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(OrderError::NotFound(order_id.to_string())),
            Err(source) => Err(OrderError::Lookup {
                order_id: order_id.to_string(),
                source,
            }),
        }
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderError> {
        let record = self.get_order_raw(order_id).await?;
        serde_json::from_slice(&record).map_err(|source| OrderError::Corrupt {
            order_id: order_id.to_string(),
            source,
        })
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::Config;
use crate::errors::ProcessError;
use crate::messaging::{Delivery, Disposition, EventHandler, OrderEvent};
use crate::metrics::Metrics;
use crate::models::Order;
use crate::state::StateStore;
use crate::utils::IsTransient;

// ============================================================================
// Order Processor
// ============================================================================
//
// received → loaded → updated → persisted
//
// Every failure before `persisted` leaves the stored record untouched, so a
// retried delivery starts from scratch. A delivery for an order that is
// already completed acks without writing.
//
// ============================================================================

/// How far a delivery got before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Loaded,
    Updated,
    Persisted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Loaded => "loaded",
            Stage::Updated => "updated",
            Stage::Persisted => "persisted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Completed,
    AlreadyCompleted,
}

pub struct OrderProcessor {
    store: Arc<dyn StateStore>,
    metrics: Arc<Metrics>,
    state_store: String,
    deadline: Duration,
}

impl OrderProcessor {
    pub fn new(
        store: Arc<dyn StateStore>,
        metrics: Arc<Metrics>,
        state_store: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            state_store: state_store.into(),
            deadline,
        }
    }

    pub fn from_config(store: Arc<dyn StateStore>, metrics: Arc<Metrics>, config: &Config) -> Self {
        Self::new(store, metrics, config.state_store.clone(), config.delivery_timeout)
    }

    /// Complete the order named by `payload`
    pub async fn complete(&self, payload: &[u8]) -> Result<Completion, ProcessError> {
        let mut stage = Stage::Received;
        self.advance(payload, &mut stage).await
    }

    async fn advance(&self, payload: &[u8], stage: &mut Stage) -> Result<Completion, ProcessError> {
        let event = OrderEvent::decode(payload)?;
        let order_id = event.order_id;

        let record = self
            .store
            .get(&self.state_store, &order_id)
            .await
            .map_err(|source| ProcessError::Load {
                order_id: order_id.clone(),
                source,
            })?
            .ok_or_else(|| ProcessError::UnknownOrder(order_id.clone()))?;

        let mut order: Order =
            serde_json::from_slice(&record).map_err(|source| ProcessError::CorruptRecord {
                order_id: order_id.clone(),
                source,
            })?;
        *stage = Stage::Loaded;

        if !order.complete() {
            tracing::debug!(order_id = %order_id, "Order already completed, nothing to do");
            return Ok(Completion::AlreadyCompleted);
        }
        *stage = Stage::Updated;

        let updated = serde_json::to_vec(&order).map_err(|source| ProcessError::Encode {
            order_id: order_id.clone(),
            source,
        })?;

        self.store
            .put(&self.state_store, &order_id, updated)
            .await
            .map_err(|source| ProcessError::Save {
                order_id: order_id.clone(),
                source,
            })?;
        *stage = Stage::Persisted;

        self.metrics.orders_completed.inc();
        tracing::info!(order_id = %order_id, "Order completed");
        Ok(Completion::Completed)
    }
}

#[async_trait]
impl EventHandler for OrderProcessor {
    async fn handle(&self, delivery: Delivery) -> Disposition {
        let started = Instant::now();
        let mut stage = Stage::Received;

        let outcome =
            tokio::time::timeout(self.deadline, self.advance(&delivery.payload, &mut stage)).await;
        let disposition = match outcome {
            Ok(Ok(_)) => Disposition::Ack,
            Ok(Err(e)) if e.is_transient() => Disposition::Retry(e),
            Ok(Err(e)) => Disposition::Reject(e),
            Err(_) => Disposition::Retry(ProcessError::DeadlineExceeded(self.deadline)),
        };

        self.metrics.record_delivery(
            &delivery.topic,
            disposition.outcome(),
            started.elapsed().as_secs_f64(),
        );

        match &disposition {
            Disposition::Ack => {}
            Disposition::Retry(e) | Disposition::Reject(e) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    attempt = delivery.attempt,
                    stage = stage.as_str(),
                    outcome = disposition.outcome(),
                    error = %e,
                    "Order event not processed"
                );
            }
        }

        disposition
    }
}

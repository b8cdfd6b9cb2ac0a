use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use kameo::Actor;
use kameo::actor::ActorRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::StateStore;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Receives payloads a subscriber gave up on: rejected as permanently bad, or
// still failing after every redelivery. Each letter is persisted through the
// state store under the dead-letter store name so operators can inspect and
// replay it; a short tail is also kept in memory for quick inspection.
//
// ============================================================================

const RECENT_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub bus: String,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct AddToDlq {
    pub bus: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub error_message: String,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct GetDlqStats;

#[derive(Debug, Clone, Default)]
pub struct DlqStats {
    pub total_messages: u64,
    pub persist_failures: u64,
    pub by_topic: HashMap<String, u64>,
    pub recent: Vec<DeadLetter>,
}

impl Reply for DlqStats {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct DeadLetterActor {
    store: Arc<dyn StateStore>,
    store_name: String,
    total: u64,
    persist_failures: u64,
    by_topic: HashMap<String, u64>,
    recent: VecDeque<DeadLetter>,
}

impl DeadLetterActor {
    pub fn new(store: Arc<dyn StateStore>, store_name: impl Into<String>) -> Self {
        Self {
            store,
            store_name: store_name.into(),
            total: 0,
            persist_failures: 0,
            by_topic: HashMap::new(),
            recent: VecDeque::new(),
        }
    }
}

impl Actor for DeadLetterActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(store = %state.store_name, "Dead letter queue ready");
        Ok(state)
    }
}

impl Message<AddToDlq> for DeadLetterActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: AddToDlq,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let letter = DeadLetter {
            id: Uuid::new_v4(),
            bus: msg.bus,
            topic: msg.topic,
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            error_message: msg.error_message,
            failure_count: msg.failure_count,
            first_failed_at: msg.first_failed_at,
            last_failed_at: Utc::now(),
        };

        tracing::error!(
            letter_id = %letter.id,
            topic = %letter.topic,
            payload = %letter.payload,
            failure_count = letter.failure_count,
            error = %letter.error_message,
            "Adding payload to dead letter queue"
        );

        self.total += 1;
        *self.by_topic.entry(letter.topic.clone()).or_default() += 1;

        match serde_json::to_vec(&letter) {
            Ok(bytes) => {
                let key = format!("dlq-{}", letter.id);
                if let Err(e) = self.store.put(&self.store_name, &key, bytes).await {
                    self.persist_failures += 1;
                    tracing::error!(
                        letter_id = %letter.id,
                        error = %e,
                        "Failed to persist dead letter"
                    );
                }
            }
            Err(e) => {
                self.persist_failures += 1;
                tracing::error!(letter_id = %letter.id, error = %e, "Failed to encode dead letter");
            }
        }

        if self.recent.len() == RECENT_LIMIT {
            self.recent.pop_front();
        }
        self.recent.push_back(letter);
    }
}

impl Message<GetDlqStats> for DeadLetterActor {
    type Reply = DlqStats;

    async fn handle(
        &mut self,
        _msg: GetDlqStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        DlqStats {
            total_messages: self.total,
            persist_failures: self.persist_failures,
            by_topic: self.by_topic.clone(),
            recent: self.recent.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateStore;
    use kameo::prelude::*;

    fn letter(topic: &str, payload: &[u8]) -> AddToDlq {
        AddToDlq {
            bus: "orders-pubsub".into(),
            topic: topic.into(),
            payload: payload.to_vec(),
            error_message: "event references unknown order order-x".into(),
            failure_count: 1,
            first_failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_letters_are_persisted_and_counted() {
        let store = Arc::new(InMemoryStateStore::new());
        let dlq = DeadLetterActor::spawn(DeadLetterActor::new(store.clone(), "orders-dlq"));

        dlq.tell(letter("orders", b"order-x")).await.unwrap();
        dlq.tell(letter("orders", b"{}")).await.unwrap();

        let stats = dlq.ask(GetDlqStats).await.unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.by_topic.get("orders"), Some(&2));
        assert_eq!(stats.recent[0].payload, "order-x");
        assert_eq!(stats.persist_failures, 0);

        let key = format!("dlq-{}", stats.recent[0].id);
        let stored = store.get("orders-dlq", &key).await.unwrap().unwrap();
        let decoded: DeadLetter = serde_json::from_slice(&stored).unwrap();
        assert_eq!(decoded, stats.recent[0]);
    }

    #[tokio::test]
    async fn test_persist_failure_is_tracked() {
        let store = Arc::new(InMemoryStateStore::new());
        store.fail_next_puts(1);
        let dlq = DeadLetterActor::spawn(DeadLetterActor::new(store.clone(), "orders-dlq"));

        dlq.tell(letter("orders", b"order-y")).await.unwrap();

        let stats = dlq.ask(GetDlqStats).await.unwrap();
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.persist_failures, 1);
        assert_eq!(store.len("orders-dlq").await, 0);
    }
}

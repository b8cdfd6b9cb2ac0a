use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::StateStore;
use crate::errors::StoreError;

/// In-process state store.
///
/// Backs single-node deployments and every pipeline test. Failures can be
/// injected per operation to exercise the retry paths.
#[derive(Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<(String, String), Vec<u8>>>,
    failing_puts: AtomicU32,
    failing_gets: AtomicU32,
    puts: AtomicU64,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` puts fail with `StoreError::Unavailable`
    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// The next `n` gets fail with `StoreError::Unavailable`
    pub fn fail_next_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    /// Number of successful puts so far
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn len(&self, store: &str) -> usize {
        self.entries.read().await.keys().filter(|(s, _)| s == store).count()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn injected(store: &str) -> StoreError {
    StoreError::Unavailable {
        store: store.to_string(),
        reason: "injected failure".to_string(),
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_puts) {
            return Err(injected(store));
        }

        self.entries
            .write()
            .await
            .insert((store.to_string(), key.to_string()), value);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if Self::take_failure(&self.failing_gets) {
            return Err(injected(store));
        }

        Ok(self
            .entries
            .read()
            .await
            .get(&(store.to_string(), key.to_string()))
            .cloned())
    }
}

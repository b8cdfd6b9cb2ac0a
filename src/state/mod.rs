// ============================================================================
// State Store Client
// ============================================================================
//
// Uniform get/put over an external key-value store, addressed by
// (store name, key). Values are opaque bytes; a put overwrites.
//
// ============================================================================

mod memory;
mod redis_store;

use async_trait::async_trait;

use crate::errors::StoreError;

pub use self::memory::InMemoryStateStore;
pub use self::redis_store::RedisStateStore;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value
    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Most recent value under `key`, `None` when nothing was ever written
    async fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

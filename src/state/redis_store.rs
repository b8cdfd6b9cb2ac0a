use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::StateStore;
use crate::errors::StoreError;

/// Redis-backed state store.
///
/// Keys are laid out as `{store}||{key}` so several logical stores can share
/// one Redis database. Cloning shares the underlying `ConnectionManager`.
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| anyhow::anyhow!("invalid Redis URL {redis_url}: {e}"))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to Redis at {redis_url}: {e}"))?;

        tracing::info!(redis_url = %redis_url, "Redis state store connected");

        Ok(Self { conn })
    }

    fn storage_key(store: &str, key: &str) -> String {
        format!("{store}||{key}")
    }
}

fn classify(store: &str, key: &str, err: redis::RedisError) -> StoreError {
    let unreachable = err.is_io_error()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_connection_refusal();
    if unreachable {
        StoreError::Unavailable {
            store: store.to_string(),
            reason: err.to_string(),
        }
    } else {
        StoreError::Rejected {
            store: store.to_string(),
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let size = value.len();

        let _: () = conn
            .set(Self::storage_key(store, key), value)
            .await
            .map_err(|e| classify(store, key, e))?;

        tracing::debug!(store = %store, key = %key, bytes = size, "State saved");
        Ok(())
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();

        let value: Option<Vec<u8>> = conn
            .get(Self::storage_key(store, key))
            .await
            .map_err(|e| classify(store, key, e))?;

        tracing::debug!(store = %store, key = %key, found = value.is_some(), "State loaded");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_layout() {
        assert_eq!(
            RedisStateStore::storage_key("orders-store", "order-1f"),
            "orders-store||order-1f"
        );
    }
}

// ============================================================================
// Order Identifiers
// ============================================================================
//
// Two deployment-time strategies behind one trait:
// - local:  `order-{hex}` from 31 random bits; likely unique, not guaranteed
// - remote: `order-{uuid}` minted by the ID generator service
//
// A deployment picks one; intake never mixes them.
//
// ============================================================================

mod remote;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::IdError;

pub use remote::RemoteIdGenerator;

pub const ORDER_ID_PREFIX: &str = "order-";

#[async_trait]
pub trait IdGenerator: Send + Sync {
    /// Label used in logs and the `ids_generated_total` metric
    fn strategy(&self) -> &'static str;

    async fn next_id(&self) -> Result<String, IdError>;
}

/// Fresh 128-bit random identifier, as served by the ID generator service
pub fn fresh_uuid() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalIdGenerator;

#[async_trait]
impl IdGenerator for LocalIdGenerator {
    fn strategy(&self) -> &'static str {
        "local"
    }

    async fn next_id(&self) -> Result<String, IdError> {
        let bits = (Uuid::new_v4().as_u128() as u32) >> 1;
        Ok(format!("{ORDER_ID_PREFIX}{bits:x}"))
    }
}

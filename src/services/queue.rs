use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// One in-flight message handed to a consumer. The payload is opaque bytes;
/// consumers decode and must acknowledge by id.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: u64,
    pub payload: Bytes,
}

/// Message queue contract with at-least-once delivery: unacknowledged
/// deliveries may be seen again, so consumers tolerate duplicates.
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn publish(&self, payload: Bytes) -> Result<()>;

    /// Takes up to `max` pending messages in flight.
    async fn consume(&self, max: usize) -> Result<Vec<Delivery>>;

    async fn ack(&self, delivery_ids: &[u64]) -> Result<()>;
}

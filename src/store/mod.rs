use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::{DeadLetter, Order, OrderStatus, OutboxMessage};

pub mod memory;
pub mod scylla_store;

pub use memory::InMemoryOrderStore;
pub use scylla_store::ScyllaOrderStore;

// ============================================================================
// Order Store - Durable order records with a status guard and an outbox
// ============================================================================
//
// Responsibilities:
// 1. Persist orders (never deleted; cancellation is a status)
// 2. Conditioned writes: "write this order only if status is still Y"
// 3. Record outbox messages atomically with the order write that caused them
// 4. Serve the read paths used by tracking lookups, sweeps and metrics
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate order: {0}")]
    Duplicate(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order together with its initial outbox messages
    async fn insert(&self, order: &Order, outbox: Vec<OutboxMessage>) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn find_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>>;

    /// Lookup by gateway request reference or transaction id
    async fn find_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>>;

    /// Replace the stored order only if its current status is `expected`.
    ///
    /// Returns `false` when the guard fails; nothing is written in that case,
    /// including the outbox messages.
    async fn compare_and_set(
        &self,
        order: &Order,
        expected: OrderStatus,
        outbox: Vec<OutboxMessage>,
    ) -> StoreResult<bool>;

    /// Orders currently in `status`, read at query time
    async fn list_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>>;

    /// Orders with `created_at` in the closed range `[start, end]`
    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>>;

    async fn tracking_number_exists(&self, tracking_number: &str) -> StoreResult<bool> {
        Ok(self.find_by_tracking_number(tracking_number).await?.is_some())
    }

    // ========================================================================
    // Outbox
    // ========================================================================

    /// Undelivered messages, oldest first
    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>>;

    /// Remove a delivered message
    async fn ack_outbox(&self, message: &OutboxMessage) -> StoreResult<()>;

    /// Move a message out of the outbox into the dead-letter list
    async fn dead_letter(&self, letter: DeadLetter) -> StoreResult<()>;

    async fn dead_letters(&self, limit: usize) -> StoreResult<Vec<DeadLetter>>;
}

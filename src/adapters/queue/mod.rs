pub mod memory;
pub mod redis;

pub use memory::MemoryQueue;
pub use redis::RedisRegistrationQueue;

use crate::domain::registration::QueueRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("Malformed lease response from queue")]
    Protocol,
}

/// At-least-once queue of raw registration bodies.
///
/// A leased record stays invisible for the visibility timeout. Records that are not acknowledged
/// before it lapses are handed out again; records delivered more than the configured maximum are
/// moved to a dead-letter list instead.
#[async_trait]
pub trait RegistrationQueue: Send + Sync + std::fmt::Debug {
    /// Appends a message and returns its identifier.
    ///
    /// # Errors
    /// Returns `QueueError` if the queue cannot be reached.
    async fn enqueue(&self, body: &str) -> Result<String, QueueError>;

    /// Leases up to `limit` visible records.
    ///
    /// # Errors
    /// Returns `QueueError` if the queue cannot be reached.
    async fn lease(&self, limit: usize, visibility_timeout: Duration) -> Result<Vec<QueueRecord>, QueueError>;

    /// Permanently removes the given records.
    ///
    /// # Errors
    /// Returns `QueueError` if the queue cannot be reached.
    async fn ack(&self, message_ids: &[String]) -> Result<(), QueueError>;

    /// Number of records moved to the dead-letter list. Entries keep their message id and body.
    ///
    /// # Errors
    /// Returns `QueueError` if the queue cannot be reached.
    async fn dead_letter_count(&self) -> Result<usize, QueueError>;

    /// Checks connectivity.
    ///
    /// # Errors
    /// Returns `QueueError` if the queue cannot be reached.
    async fn ping(&self) -> Result<(), QueueError>;
}

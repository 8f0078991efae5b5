pub mod memory;
pub mod records;
pub mod token_repo;

pub use memory::MemoryTokenStore;
pub use token_repo::PgTokenStore;

use crate::config::DatabaseConfig;
use crate::domain::token::TokenRecord;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use thiserror::Error;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
}

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt record for token: {0}")]
    Corrupt(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable token table keyed by the token string.
///
/// Implementations must be safe to call concurrently for different tokens. `insert_if_absent` is
/// the only synchronization point between concurrent registrations of the same token.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Writes `record` only if no record exists for its token.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be reached. An existing key is reported as
    /// `Ok(false)`, not as an error.
    async fn insert_if_absent(&self, record: &TokenRecord) -> Result<bool, StoreError>;

    /// Deletes the record for `token`. Deleting a missing token succeeds.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be reached.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;

    /// Overwrites the mutable fields of an existing record.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be reached.
    async fn update(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Moves the expiry of `token` to `now + ttl_days`.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be reached.
    async fn refresh_expiry(&self, token: &str, now: i64, ttl_days: i64) -> Result<(), StoreError>;

    /// # Errors
    /// Returns `StoreError` if the store cannot be reached or the row cannot be decoded.
    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Checks connectivity.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be reached.
    async fn ping(&self) -> Result<(), StoreError>;
}

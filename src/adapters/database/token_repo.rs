use crate::adapters::database::records::TokenRow;
use crate::adapters::database::{DbPool, StoreError, TokenStore};
use crate::domain::token::{TokenRecord, expiry_from};
use async_trait::async_trait;

/// `push_tokens` table in PostgreSQL.
#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: DbPool,
}

impl PgTokenStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    #[tracing::instrument(level = "debug", skip(self, record), err)]
    async fn insert_if_absent(&self, record: &TokenRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO push_tokens (token, created_at, expire_at, topics, subscription_status, last_attempt_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (token) DO NOTHING
            "#,
        )
        .bind(&record.token)
        .bind(record.created_at)
        .bind(record.expire_at)
        .bind(&record.topics)
        .bind(record.subscription_status.as_str())
        .bind(record.last_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(level = "debug", skip(self, token), err)]
    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM push_tokens WHERE token = $1").bind(token).execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, record), err)]
    async fn update(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE push_tokens
            SET expire_at = $2, topics = $3, subscription_status = $4, last_attempt_at = $5
            WHERE token = $1
            "#,
        )
        .bind(&record.token)
        .bind(record.expire_at)
        .bind(&record.topics)
        .bind(record.subscription_status.as_str())
        .bind(record.last_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, token), err)]
    async fn refresh_expiry(&self, token: &str, now: i64, ttl_days: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE push_tokens SET expire_at = $2 WHERE token = $1")
            .bind(token)
            .bind(expiry_from(now, ttl_days))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, token), err)]
    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT token, created_at, expire_at, topics, subscription_status, last_attempt_at
            FROM push_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenRecord::try_from).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

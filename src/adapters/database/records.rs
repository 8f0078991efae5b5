use crate::adapters::database::StoreError;
use crate::domain::token::TokenRecord;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TokenRow {
    pub(crate) token: String,
    pub(crate) created_at: i64,
    pub(crate) expire_at: i64,
    pub(crate) topics: Vec<String>,
    pub(crate) subscription_status: String,
    pub(crate) last_attempt_at: Option<i64>,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let subscription_status = row.subscription_status.parse().map_err(|_| StoreError::Corrupt(row.token.clone()))?;
        Ok(Self {
            token: row.token,
            created_at: row.created_at,
            expire_at: row.expire_at,
            topics: row.topics,
            subscription_status,
            last_attempt_at: row.last_attempt_at,
        })
    }
}

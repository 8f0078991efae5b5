use crate::adapters::database::{StoreError, TokenStore};
use crate::domain::token::{TokenRecord, expiry_from};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process token store with the same conditional-insert semantics as the Postgres table.
///
/// Records never expire here; the expiry horizon is only carried as data.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: DashMap<String, TokenRecord>,
    unavailable: AtomicBool,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, token: &str) -> Option<TokenRecord> {
        self.records.get(token).map(|r| r.value().clone())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_if_absent(&self, record: &TokenRecord) -> Result<bool, StoreError> {
        self.check_available()?;
        match self.records.entry(record.token.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.records.remove(token);
        Ok(())
    }

    async fn update(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(mut existing) = self.records.get_mut(&record.token) {
            existing.expire_at = record.expire_at;
            existing.topics.clone_from(&record.topics);
            existing.subscription_status = record.subscription_status;
            existing.last_attempt_at = record.last_attempt_at;
        }
        Ok(())
    }

    async fn refresh_expiry(&self, token: &str, now: i64, ttl_days: i64) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(mut existing) = self.records.get_mut(token) {
            existing.expire_at = expiry_from(now, ttl_days);
        }
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        self.check_available()?;
        Ok(self.get(token))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

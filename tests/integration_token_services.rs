mod common;

use common::{FakeProvider, setup_tracing};
use push_registrar::adapters::database::{MemoryTokenStore, TokenStore};
use push_registrar::domain::token::{SubscriptionStatus, TokenRecord, unix_now};
use push_registrar::services::{SubscriptionManager, SubscriptionOutcome, TokenValidator, ValidationError};
use std::sync::Arc;

fn fixtures() -> (Arc<FakeProvider>, Arc<MemoryTokenStore>) {
    setup_tracing();
    (Arc::new(FakeProvider::default()), Arc::new(MemoryTokenStore::new()))
}

async fn stored(store: &MemoryTokenStore, token: &str) -> TokenRecord {
    let record = TokenRecord::new(token, "news", unix_now(), 90);
    store.insert_if_absent(&record).await.unwrap();
    record
}

#[tokio::test]
async fn test_valid_token_passes() {
    let (provider, store) = fixtures();
    let validator = TokenValidator::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    assert_eq!(validator.validate("good").await, Ok(()));
    assert_eq!(provider.probe_count(), 1);
}

#[tokio::test]
async fn test_unregistered_token_is_dead_and_deleted() {
    let (provider, store) = fixtures();
    stored(&store, "gone").await;
    provider.mark_dead("gone");
    let validator = TokenValidator::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    assert!(matches!(validator.validate("gone").await, Err(ValidationError::Dead(_))));
    assert!(store.get("gone").is_none());
}

#[tokio::test]
async fn test_malformed_token_is_dead() {
    let (provider, store) = fixtures();
    provider.mark_invalid("junk");
    let validator = TokenValidator::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    assert!(matches!(validator.validate("junk").await, Err(ValidationError::Dead(_))));
}

#[tokio::test]
async fn test_transient_failure_keeps_record() {
    let (provider, store) = fixtures();
    stored(&store, "flaky").await;
    provider.fail_probes("flaky", 1);
    let validator = TokenValidator::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    assert!(matches!(validator.validate("flaky").await, Err(ValidationError::Transient(_))));
    assert!(store.get("flaky").is_some());
}

#[tokio::test]
async fn test_delete_failure_does_not_change_outcome() {
    let (provider, store) = fixtures();
    store.set_unavailable(true);
    provider.mark_dead("gone");
    let validator = TokenValidator::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    assert!(matches!(validator.validate("gone").await, Err(ValidationError::Dead(_))));
}

#[tokio::test]
async fn test_subscription_success_is_persisted() {
    let (provider, store) = fixtures();
    let record = stored(&store, "tok").await;
    let manager = SubscriptionManager::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    let outcome = manager.subscribe(&record, "news").await;

    assert_eq!(outcome, SubscriptionOutcome::Subscribed);
    let saved = store.get("tok").unwrap();
    assert_eq!(saved.subscription_status, SubscriptionStatus::Subscribed);
    assert!(saved.last_attempt_at.is_some());
    assert_eq!(saved.created_at, record.created_at);
    assert_eq!(provider.subscribe_calls(), vec![(vec!["tok".to_string()], "news".to_string())]);
}

#[tokio::test]
async fn test_subscription_failure_is_persisted_without_retry() {
    let (provider, store) = fixtures();
    let record = stored(&store, "tok").await;
    provider.fail_subscriptions(true);
    let manager = SubscriptionManager::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);

    let outcome = manager.subscribe(&record, "news").await;

    assert!(matches!(outcome, SubscriptionOutcome::Failed { .. }));
    assert_eq!(store.get("tok").unwrap().subscription_status, SubscriptionStatus::Failed);
    assert_eq!(provider.subscribe_count(), 1);
}

#[tokio::test]
async fn test_subscription_persist_failure_keeps_provider_outcome() {
    let (provider, store) = fixtures();
    let record = stored(&store, "tok").await;
    let manager = SubscriptionManager::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);
    store.set_unavailable(true);

    assert_eq!(manager.subscribe(&record, "news").await, SubscriptionOutcome::Subscribed);
}

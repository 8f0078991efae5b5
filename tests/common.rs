#![allow(dead_code)]

use async_trait::async_trait;
use push_registrar::adapters::database::MemoryTokenStore;
use push_registrar::adapters::push::{MessagingProvider, ProviderError};
use push_registrar::config::{
    Config, DatabaseConfig, FcmConfig, HealthConfig, QueueConfig, RegistrationConfig, ServerConfig, TelemetryConfig,
};
use push_registrar::services::{BatchProcessor, SubscriptionManager, TokenValidator};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("push_registrar=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn get_test_config() -> Config {
    Config {
        database: DatabaseConfig::default(),
        queue: QueueConfig { visibility_timeout_secs: 0, poll_interval_ms: 10, ..QueueConfig::default() },
        registration: RegistrationConfig::default(),
        fcm: FcmConfig {
            project_id: "test-project".to_string(),
            access_token: "test-access-token".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            iid_base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 2000,
        },
        server: ServerConfig::default(),
        health: HealthConfig::default(),
        telemetry: TelemetryConfig::default(),
    }
}

pub fn registration_body(token: &str, topic: &str) -> String {
    serde_json::json!({ "token": token, "topic": topic }).to_string()
}

/// Provider double: tokens are valid unless marked otherwise, and every call is recorded.
#[derive(Debug, Default)]
pub struct FakeProvider {
    dead: Mutex<HashSet<String>>,
    invalid: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    failing_probes: Mutex<HashMap<String, usize>>,
    subscribe_fails: AtomicBool,
    probes: AtomicUsize,
    subscriptions: Mutex<Vec<(Vec<String>, String)>>,
}

impl FakeProvider {
    pub fn mark_dead(&self, token: &str) {
        self.dead.lock().unwrap().insert(token.to_string());
    }

    pub fn mark_invalid(&self, token: &str) {
        self.invalid.lock().unwrap().insert(token.to_string());
    }

    /// Probing `token` panics inside the provider call.
    pub fn panic_on(&self, token: &str) {
        self.panicking.lock().unwrap().insert(token.to_string());
    }

    /// The next `times` probes for `token` fail with a transient error.
    pub fn fail_probes(&self, token: &str, times: usize) {
        self.failing_probes.lock().unwrap().insert(token.to_string(), times);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.subscribe_fails.store(fail, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> Vec<(Vec<String>, String)> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn subscribe_count_for(&self, token: &str) -> usize {
        self.subscriptions.lock().unwrap().iter().filter(|(tokens, _)| tokens.iter().any(|t| t == token)).count()
    }
}

#[async_trait]
impl MessagingProvider for FakeProvider {
    async fn send_probe(&self, token: &str) -> Result<(), ProviderError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        // Let concurrent records interleave between stages.
        tokio::task::yield_now().await;

        if self.panicking.lock().unwrap().contains(token) {
            panic!("provider exploded");
        }
        if self.dead.lock().unwrap().contains(token) {
            return Err(ProviderError::Unregistered);
        }
        if self.invalid.lock().unwrap().contains(token) {
            return Err(ProviderError::InvalidToken);
        }
        if let Some(remaining) = self.failing_probes.lock().unwrap().get_mut(token)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ProviderError::Rejected { code: Some("UNAVAILABLE".into()), message: "try again".into() });
        }
        Ok(())
    }

    async fn subscribe(&self, tokens: &[String], topic: &str) -> Result<(), ProviderError> {
        tokio::task::yield_now().await;
        self.subscriptions.lock().unwrap().push((tokens.to_vec(), topic.to_string()));
        if self.subscribe_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected { code: Some("INTERNAL".into()), message: "topic backend down".into() });
        }
        Ok(())
    }
}

pub struct Harness {
    pub processor: BatchProcessor,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<MemoryTokenStore>,
}

pub fn harness_with(config: &RegistrationConfig) -> Harness {
    setup_tracing();
    let provider = Arc::new(FakeProvider::default());
    let store = Arc::new(MemoryTokenStore::new());

    let validator = TokenValidator::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);
    let subscriptions = SubscriptionManager::new(Arc::clone(&provider) as _, Arc::clone(&store) as _);
    let processor = BatchProcessor::new(validator, Arc::clone(&store) as _, subscriptions, config);

    Harness { processor, provider, store }
}

pub fn harness() -> Harness {
    harness_with(&RegistrationConfig::default())
}

use crate::adapters::database::TokenStore;
use crate::adapters::push::MessagingProvider;
use crate::domain::token::{SubscriptionStatus, TokenRecord, unix_now};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Subscribed,
    Failed { error: String },
}

impl SubscriptionOutcome {
    #[must_use]
    pub const fn status(&self) -> SubscriptionStatus {
        match self {
            Self::Subscribed => SubscriptionStatus::Subscribed,
            Self::Failed { .. } => SubscriptionStatus::Failed,
        }
    }
}

/// Subscribes freshly stored tokens to their topic and records the result on the token.
#[derive(Clone, Debug)]
pub struct SubscriptionManager {
    provider: Arc<dyn MessagingProvider>,
    store: Arc<dyn TokenStore>,
    subscriptions: Counter<u64>,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(provider: Arc<dyn MessagingProvider>, store: Arc<dyn TokenStore>) -> Self {
        let subscriptions = global::meter("push-registrar")
            .u64_counter("registrar_subscriptions_total")
            .with_description("Topic subscription attempts, by status")
            .build();
        Self { provider, store, subscriptions }
    }

    /// Subscribes `record.token` to `topic` and persists the outcome with a single store update.
    ///
    /// Never retries. A failed persist is logged; the returned outcome still reflects the provider.
    #[tracing::instrument(level = "debug", skip(self, record), fields(status = tracing::field::Empty))]
    pub async fn subscribe(&self, record: &TokenRecord, topic: &str) -> SubscriptionOutcome {
        let outcome = match self.provider.subscribe(std::slice::from_ref(&record.token), topic).await {
            Ok(()) => SubscriptionOutcome::Subscribed,
            Err(e) => {
                tracing::warn!(error = %e, "Topic subscription failed");
                SubscriptionOutcome::Failed { error: e.to_string() }
            }
        };

        let status = outcome.status();
        tracing::Span::current().record("status", status.as_str());
        self.subscriptions.add(1, &[KeyValue::new("status", status.as_str())]);

        let mut updated = record.clone();
        if !updated.record_attempt(status, unix_now()) {
            tracing::warn!(current = %record.subscription_status, "Subscription status already decided");
        }

        if let Err(e) = self.store.update(&updated).await {
            tracing::error!(error = %e, "Failed to persist subscription outcome");
        }

        outcome
    }
}

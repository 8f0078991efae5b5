use crate::adapters::database::TokenStore;
use crate::adapters::push::MessagingProvider;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Token is dead: {0}")]
    Dead(String),
    #[error("Token validation failed transiently: {0}")]
    Transient(String),
}

#[derive(Clone, Debug)]
struct Metrics {
    probes: Counter<u64>,
    invalidated_tokens: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("push-registrar");
        Self {
            probes: meter
                .u64_counter("registrar_probes_total")
                .with_description("Validation probes sent, by result")
                .build(),
            invalidated_tokens: meter
                .u64_counter("registrar_invalidated_tokens_total")
                .with_description("Tokens removed because the provider reported them dead")
                .build(),
        }
    }
}

/// Confirms a token is still registered with the provider by sending it a silent probe.
#[derive(Clone, Debug)]
pub struct TokenValidator {
    provider: Arc<dyn MessagingProvider>,
    store: Arc<dyn TokenStore>,
    metrics: Metrics,
}

impl TokenValidator {
    #[must_use]
    pub fn new(provider: Arc<dyn MessagingProvider>, store: Arc<dyn TokenStore>) -> Self {
        Self { provider, store, metrics: Metrics::new() }
    }

    /// Probes `token`. A dead token is also removed from the store.
    ///
    /// # Errors
    /// Returns `ValidationError::Dead` if the provider reports the token unregistered or malformed,
    /// and `ValidationError::Transient` for every other provider failure.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn validate(&self, token: &str) -> Result<(), ValidationError> {
        match self.provider.send_probe(token).await {
            Ok(()) => {
                self.metrics.probes.add(1, &[KeyValue::new("result", "valid")]);
                Ok(())
            }
            Err(e) if e.is_token_dead() => {
                tracing::info!(reason = %e, "Token rejected by provider, removing stored record");
                self.metrics.probes.add(1, &[KeyValue::new("result", "dead")]);
                self.metrics.invalidated_tokens.add(1, &[]);

                if let Err(delete_err) = self.store.delete(token).await {
                    tracing::error!(error = %delete_err, "Failed to delete dead token");
                }
                Err(ValidationError::Dead(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token validation inconclusive, keeping stored state");
                self.metrics.probes.add(1, &[KeyValue::new("result", "transient")]);
                Err(ValidationError::Transient(e.to_string()))
            }
        }
    }
}

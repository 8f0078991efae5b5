use crate::adapters::database::TokenStore;
use crate::config::{ExistingTokenPolicy, RegistrationConfig};
use crate::domain::registration::{
    BatchResponse, QueueRecord, RecordFailure, RecordOutcome, RecordState, RegistrationRequest,
};
use crate::domain::token::{TokenRecord, unix_now};
use crate::services::subscription::{SubscriptionManager, SubscriptionOutcome};
use crate::services::validator::{TokenValidator, ValidationError};
use futures::{FutureExt, StreamExt, stream};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    records: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("push-registrar");
        Self {
            records: meter
                .u64_counter("registrar_records_total")
                .with_description("Registration records processed, by outcome")
                .build(),
        }
    }
}

/// Drives each queue record through validation, storage and subscription.
///
/// Failures are contained per record: a batch always yields a response, and only the records
/// listed in `batch_item_failures` need to be redelivered.
#[derive(Clone, Debug)]
pub struct BatchProcessor {
    validator: TokenValidator,
    store: Arc<dyn TokenStore>,
    subscriptions: SubscriptionManager,
    ttl_days: i64,
    concurrency: usize,
    existing_token_policy: ExistingTokenPolicy,
    metrics: Metrics,
}

impl BatchProcessor {
    #[must_use]
    pub fn new(
        validator: TokenValidator,
        store: Arc<dyn TokenStore>,
        subscriptions: SubscriptionManager,
        config: &RegistrationConfig,
    ) -> Self {
        Self {
            validator,
            store,
            subscriptions,
            ttl_days: config.token_ttl_days,
            concurrency: config.worker_concurrency.max(1),
            existing_token_policy: config.existing_token_policy,
            metrics: Metrics::new(),
        }
    }

    /// Processes every record of a batch, at most `worker_concurrency` at a time.
    #[tracing::instrument(
        skip(self, records),
        fields(size = records.len(), succeeded = tracing::field::Empty, failed = tracing::field::Empty)
    )]
    pub async fn process_batch(&self, records: Vec<QueueRecord>) -> BatchResponse {
        let outcomes: Vec<(String, RecordOutcome)> = stream::iter(records)
            .map(|record| async move {
                let span = tracing::debug_span!("process_record", message_id = %record.message_id);
                let outcome = self.process_record_isolated(&record.body).instrument(span).await;
                (record.message_id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut response = BatchResponse::default();
        for (message_id, outcome) in outcomes {
            match &outcome {
                RecordOutcome::Failed(failure) => {
                    tracing::warn!(%message_id, kind = failure.kind(), error = %failure, "Record failed");
                    self.metrics.records.add(1, &[KeyValue::new("outcome", failure.kind())]);
                }
                other => {
                    tracing::debug!(%message_id, outcome = other.label(), "Record done");
                    self.metrics.records.add(1, &[KeyValue::new("outcome", other.label())]);
                }
            }
            response.record(message_id, &outcome);
        }

        let span = tracing::Span::current();
        span.record("succeeded", response.succeeded.len());
        span.record("failed", response.batch_item_failures.len());
        response
    }

    /// Runs one record, turning a panic anywhere inside it into `UnexpectedFault`.
    async fn process_record_isolated(&self, body: &str) -> RecordOutcome {
        AssertUnwindSafe(self.process_record(body)).catch_unwind().await.unwrap_or_else(|panic| {
            RecordOutcome::Failed(RecordFailure::UnexpectedFault(panic_message(panic.as_ref())))
        })
    }

    /// Runs one record body through the registration state machine.
    pub async fn process_record(&self, body: &str) -> RecordOutcome {
        let mut state = RecordState::Received;
        loop {
            tracing::trace!(state = state.name(), "Advancing record");
            state = match state {
                RecordState::Received => match RegistrationRequest::parse(body) {
                    Ok(request) => RecordState::Parsed(request),
                    Err(failure) => RecordState::Failed(failure),
                },
                RecordState::Parsed(request) => match self.validator.validate(&request.token).await {
                    Ok(()) => RecordState::Validated(request),
                    Err(ValidationError::Dead(reason)) => {
                        RecordState::Failed(RecordFailure::ProviderValidationDead(reason))
                    }
                    Err(ValidationError::Transient(reason)) => {
                        RecordState::Failed(RecordFailure::ProviderValidationTransient(reason))
                    }
                },
                RecordState::Validated(request) => {
                    let record = TokenRecord::new(request.token, &request.topic, unix_now(), self.ttl_days);
                    match self.store.insert_if_absent(&record).await {
                        Ok(inserted) => RecordState::Stored { record, topic: request.topic, inserted },
                        Err(e) => RecordState::Failed(RecordFailure::StoreUnavailable(e.to_string())),
                    }
                }
                RecordState::Stored { record, inserted: false, .. } => {
                    self.apply_existing_token_policy(&record.token).await;
                    RecordState::Skipped
                }
                RecordState::Stored { record, topic, inserted: true } => {
                    match self.subscriptions.subscribe(&record, &topic).await {
                        SubscriptionOutcome::Subscribed => RecordState::Subscribed,
                        SubscriptionOutcome::Failed { .. } => RecordState::SubscriptionFailed,
                    }
                }
                RecordState::Subscribed => return RecordOutcome::Subscribed,
                RecordState::SubscriptionFailed => return RecordOutcome::SubscriptionFailed,
                RecordState::Skipped => return RecordOutcome::Skipped,
                RecordState::Failed(failure) => return RecordOutcome::Failed(failure),
            };
        }
    }

    async fn apply_existing_token_policy(&self, token: &str) {
        match self.existing_token_policy {
            ExistingTokenPolicy::Keep => tracing::debug!("Token already registered, skipping"),
            ExistingTokenPolicy::Refresh => {
                if let Err(e) = self.store.refresh_expiry(token, unix_now(), self.ttl_days).await {
                    tracing::warn!(error = %e, "Failed to refresh expiry of existing token");
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic during record processing".to_string())
}

use crate::adapters::queue::{QueueError, RegistrationQueue};
use crate::config::QueueConfig;
use crate::domain::registration::BatchResponse;
use crate::services::BatchProcessor;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    batches: Counter<u64>,
    redeliveries: Counter<u64>,
    dead_letters: Gauge<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("push-registrar");
        Self {
            batches: meter
                .u64_counter("registrar_batches_total")
                .with_description("Total number of registration batches processed")
                .build(),
            redeliveries: meter
                .u64_counter("registrar_redeliveries_total")
                .with_description("Records left on the queue for redelivery after a failure")
                .build(),
            dead_letters: meter
                .u64_gauge("registrar_dead_letters")
                .with_description("Records moved to the dead-letter list after exhausting their deliveries")
                .build(),
        }
    }
}

/// Leases registration batches from the queue and acknowledges the records that succeeded.
#[derive(Debug)]
pub struct RegistrationWorker {
    queue: Arc<dyn RegistrationQueue>,
    processor: BatchProcessor,
    batch_size: usize,
    visibility_timeout: Duration,
    poll_interval: Duration,
    dead_letters_seen: AtomicUsize,
    metrics: Metrics,
}

impl RegistrationWorker {
    #[must_use]
    pub fn new(queue: Arc<dyn RegistrationQueue>, processor: BatchProcessor, config: &QueueConfig) -> Self {
        Self {
            queue,
            processor,
            batch_size: config.batch_size.max(1),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            dead_letters_seen: AtomicUsize::new(0),
            metrics: Metrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.drain()
                        .instrument(tracing::debug_span!("registration_iteration"))
                        .await
                    {
                        tracing::error!(error = %e, "Failed to process registration batch");
                    }
                    if let Err(e) = self.check_dead_letters().await {
                        tracing::warn!(error = %e, "Failed to read dead-letter count");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Registration worker shutting down...");
    }

    /// Keeps leasing while batches come back full, so a backlog is not throttled by the poll interval.
    async fn drain(&self) -> Result<(), QueueError> {
        while let Some(response) = self.process_next_batch().await? {
            if response.succeeded.len() + response.batch_item_failures.len() < self.batch_size {
                break;
            }
        }
        Ok(())
    }

    /// Publishes the dead-letter count and warns when it has grown since the last check.
    ///
    /// # Errors
    /// Returns `QueueError` if the queue cannot be reached.
    pub async fn check_dead_letters(&self) -> Result<usize, QueueError> {
        let count = self.queue.dead_letter_count().await?;
        self.metrics.dead_letters.record(count as u64, &[]);

        let previous = self.dead_letters_seen.swap(count, Ordering::Relaxed);
        if count > previous {
            tracing::warn!(
                new = count - previous,
                total = count,
                "Registration records exhausted their deliveries and were dead-lettered"
            );
        }
        Ok(count)
    }

    /// Leases one batch, processes it and acknowledges the succeeded records.
    ///
    /// Failed records are left leased; the queue hands them out again once the visibility timeout
    /// lapses. Returns `None` when nothing was visible.
    ///
    /// # Errors
    /// Returns `QueueError` if leasing fails. A failed acknowledgment is logged only, since
    /// reprocessing an acknowledged-late record is harmless.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn process_next_batch(&self) -> Result<Option<BatchResponse>, QueueError> {
        let records = self.queue.lease(self.batch_size, self.visibility_timeout).await?;
        if records.is_empty() {
            tracing::debug!("No registration records visible");
            return Ok(None);
        }

        tracing::info!(count = records.len(), "Processing leased registration records");
        let response = self.processor.process_batch(records).await;
        self.metrics.batches.add(1, &[]);

        if let Err(e) = self.queue.ack(&response.succeeded).await {
            tracing::error!(error = %e, count = response.succeeded.len(), "Failed to acknowledge records");
        }

        if !response.is_complete_success() {
            let failed = response.batch_item_failures.len();
            tracing::warn!(failed, "Leaving failed records for redelivery");
            self.metrics.redeliveries.add(failed as u64, &[]);
        }

        Ok(Some(response))
    }
}

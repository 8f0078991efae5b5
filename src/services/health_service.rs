use crate::adapters::database::TokenStore;
use crate::adapters::queue::RegistrationQueue;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("push-registrar");
        Self {
            status: meter
                .i64_gauge("registrar_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    store: Arc<dyn TokenStore>,
    queue: Arc<dyn RegistrationQueue>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, queue: Arc<dyn RegistrationQueue>, config: HealthConfig) -> Self {
        Self { store, queue, config, metrics: Metrics::new() }
    }

    /// Checks token store connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let db_timeout = Duration::from_millis(self.config.db_timeout_ms);

        match timeout(db_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "database")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "database")]);
                Err(format!("Database connection failed: {e}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "database")]);
                Err("Database connection timed out".to_string())
            }
        }
    }

    /// Checks queue connectivity.
    ///
    /// # Errors
    /// Returns a string describing the failure if the queue is unreachable.
    pub async fn check_queue(&self) -> Result<(), String> {
        let queue_timeout = Duration::from_millis(self.config.queue_timeout_ms);

        match timeout(queue_timeout, self.queue.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "queue")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "queue")]);
                Err(format!("Queue connection failed: {e}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "queue")]);
                Err("Queue connection timed out".to_string())
            }
        }
    }

    /// Number of dead-lettered registrations, or `None` if the queue did not answer in time.
    pub async fn dead_letters(&self) -> Option<usize> {
        let queue_timeout = Duration::from_millis(self.config.queue_timeout_ms);

        match timeout(queue_timeout, self.queue.dead_letter_count()).await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to read dead-letter count");
                None
            }
            Err(_) => None,
        }
    }
}

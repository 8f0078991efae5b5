#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::TokenStore;
use crate::adapters::push::MessagingProvider;
use crate::adapters::queue::RegistrationQueue;
use crate::api::{AppState, MgmtState};
use crate::config::Config;
use crate::services::{BatchProcessor, HealthService, SubscriptionManager, TokenValidator};
use crate::workers::RegistrationWorker;
use std::sync::Arc;
use tokio::sync::watch;

/// Fully wired application: routers ready to serve and the worker ready to spawn.
#[derive(Debug)]
pub struct App {
    pub api_router: axum::Router,
    pub mgmt_router: axum::Router,
    pub worker: RegistrationWorker,
}

#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    store: Option<Arc<dyn TokenStore>>,
    queue: Option<Arc<dyn RegistrationQueue>>,
    provider: Option<Arc<dyn MessagingProvider>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, store: None, queue: None, provider: None }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn RegistrationQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn MessagingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Wires the services, worker and routers together.
    ///
    /// # Errors
    /// Returns an error if the store, queue or provider was not supplied.
    pub fn build(self) -> anyhow::Result<App> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("token store is required"))?;
        let queue = self.queue.ok_or_else(|| anyhow::anyhow!("registration queue is required"))?;
        let provider = self.provider.ok_or_else(|| anyhow::anyhow!("messaging provider is required"))?;

        let validator = TokenValidator::new(Arc::clone(&provider), Arc::clone(&store));
        let subscriptions = SubscriptionManager::new(provider, Arc::clone(&store));
        let processor = BatchProcessor::new(validator, Arc::clone(&store), subscriptions, &self.config.registration);
        let worker = RegistrationWorker::new(Arc::clone(&queue), processor, &self.config.queue);

        let health_service = HealthService::new(store, Arc::clone(&queue), self.config.health.clone());

        Ok(App {
            api_router: api::app_router(AppState { queue }),
            mgmt_router: api::mgmt_router(MgmtState { health_service }),
            worker,
        })
    }
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

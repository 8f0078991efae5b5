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

use push_registrar::adapters::database::{self, PgTokenStore};
use push_registrar::adapters::push::FcmProvider;
use push_registrar::adapters::queue::RedisRegistrationQueue;
use push_registrar::adapters::redis::RedisClient;
use push_registrar::config::Config;
use push_registrar::{AppBuilder, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let boot_span = tracing::info_span!("boot_registrar");
    let (app, api_listener, mgmt_listener) = async {
        // Infrastructure
        let pool = database::init_pool(&config.database).await?;
        database::run_migrations(&pool).await?;
        let redis = RedisClient::connect(&config.queue).await?;

        // Wiring
        let app = AppBuilder::new(config.clone())
            .with_store(Arc::new(PgTokenStore::new(pool)))
            .with_queue(Arc::new(RedisRegistrationQueue::new(redis, &config.queue)))
            .with_provider(Arc::new(FcmProvider::new(&config.fcm)?))
            .build()?;

        // Listeners
        let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;

        tracing::info!(address = %api_addr, "listening");
        tracing::info!(address = %mgmt_addr, "management server listening");

        let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        Ok::<_, anyhow::Error>((app, api_listener, mgmt_listener))
    }
    .instrument(boot_span)
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    push_registrar::spawn_signal_handler(shutdown_tx.clone());

    let worker_task = tokio::spawn(app.worker.run(shutdown_rx.clone()));

    let mut api_rx = shutdown_rx.clone();
    let api_server = axum::serve(api_listener, app.api_router).with_graceful_shutdown(async move {
        let _ = api_rx.wait_for(|&s| s).await;
    });

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, app.mgmt_router).with_graceful_shutdown(async move {
        let _ = mgmt_rx.wait_for(|&s| s).await;
    });

    if let Err(e) = tokio::try_join!(api_server.into_future(), mgmt_server.into_future()) {
        tracing::error!(error = %e, "Server error");
    }

    // Servers have stopped; make sure the worker sees the shutdown too.
    let _ = shutdown_tx.send(true);
    tokio::select! {
        _ = worker_task => {
            tracing::info!("Registration worker finished.");
        }
        () = tokio::time::sleep(Duration::from_secs(config.server.shutdown_timeout_secs)) => {
            tracing::warn!("Timeout waiting for registration worker to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}

//! Service entry point.

use std::sync::Arc;

use application::{LogNotifier, NotificationConsumer};
use service::{Config, ServiceError, Services, create_app, telemetry, worker};
use tokio::signal;
use tokio::sync::watch;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // 1. Configuration and telemetry
    let config = Config::from_env()?;
    telemetry::init_tracing(&config)?;
    let metrics_handle = telemetry::install_metrics()?;

    // 2. Store, cache and command services
    let services = Services::connect(&config).await?;

    // 3. Event consumers and the outbox relay
    let consumer = NotificationConsumer::new(services.cache.clone(), Arc::new(LogNotifier));
    let consumer_task = consumer.spawn(services.events.subscribe());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = worker::spawn_outbox_relay(
        services.orchestrator.relay().clone(),
        config.relay_schedule(),
        shutdown_rx,
    );

    // 4. Operational endpoints
    let app = create_app(metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting order service");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Drain background work
    let _ = shutdown_tx.send(true);
    if let Err(e) = relay_task.await {
        tracing::warn!(error = %e, "outbox relay task ended abnormally");
    }
    drop(services);
    consumer_task.abort();

    tracing::info!("service shut down gracefully");
    Ok(())
}

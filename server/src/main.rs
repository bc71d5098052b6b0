//! Repair desk HTTP server.
//!
//! Connects to `PostgreSQL`, applies migrations, optionally seeds demo data
//! and serves the request API until Ctrl+C or SIGTERM.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use repair_desk_core::environment::SystemClock;
use repair_desk_core::lifecycle::LifecycleEngine;
use repair_desk_postgres::PostgresRequestStore;
use repair_desk_server::{Config, SeedOutcome, metrics::register_metrics, seed_demo_data};
use repair_desk_web::{AppState, build_router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is normal outside development
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,repair_desk=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Repair Desk HTTP Server");

    let config = Config::from_env();
    info!(
        database = %config.postgres.redacted_url(),
        address = %config.server.addr(),
        seed = config.seed_demo_data,
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = config
        .server
        .metrics_addr()
        .parse()
        .context("invalid metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    register_metrics();
    info!(address = %metrics_addr, "Metrics exporter listening");

    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(config.postgres.connect_timeout())
        .idle_timeout(Some(config.postgres.idle_timeout()))
        .connect(&config.postgres.url)
        .await
        .context("failed to connect to PostgreSQL")?;
    let store = PostgresRequestStore::from_pool(pool);
    store.ping().await.context("database ping failed")?;
    store.migrate().await.context("database migration failed")?;
    info!("Database ready");

    let engine = LifecycleEngine::new(Arc::new(store), Arc::new(SystemClock));

    if config.seed_demo_data {
        if seed_demo_data(&engine).await.context("demo seed failed")? == SeedOutcome::Skipped {
            info!("Database already has users, demo seed skipped");
        }
    }

    let app = build_router(AppState::new(engine));

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal
/// is never awaited.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

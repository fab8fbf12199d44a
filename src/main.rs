//! webprofiler Binary Entry Point
//!
//! Runs a small demo application behind the profiler.
//! Core functionality is provided by the `webprofiler` library crate.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::{Json, Router, http::StatusCode, response::Html, routing::get};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webprofiler::{
    collector::{CollectorRegistry, builtin},
    config::{AppConfig, DatabaseDriver, parse_duration},
    engine::ProfilerEngine,
    router::ToolbarRouter,
    server::{AppState, create_router},
    storage::{StorageBuilder, StorageHandles},
};

/// webprofiler - In-process Web Request Profiler
#[derive(Parser, Debug)]
#[command(name = "webprofiler", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "WEBPROFILER_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "WEBPROFILER_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "WEBPROFILER_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL, or `memory` (overrides config file)
    #[arg(long, env = "WEBPROFILER_DB_URL")]
    db_url: Option<String>,

    /// Purge records older than this at startup, e.g. `7d` (overrides config file)
    #[arg(long, env = "WEBPROFILER_RETENTION", value_parser = parse_duration)]
    retention: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webprofiler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("webprofiler - In-process Web Request Profiler");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file, falling back to defaults
    let mut config = if Path::new(&cli.config).exists() {
        tracing::info!("Loading configuration from: {}", cli.config);
        AppConfig::load(&cli.config)?
    } else {
        tracing::info!("No configuration at {}, using defaults", cli.config);
        AppConfig::default()
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(dsn) = cli.db_url {
        config.database.driver = if dsn == "memory" {
            DatabaseDriver::Memory
        } else {
            DatabaseDriver::Sqlite
        };
        config.database.dsn = dsn;
    }
    if let Some(retention) = cli.retention {
        config.profiler.retention = Some(retention);
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {} ({})",
        config.server.bind,
        config.server.port,
        config.database.dsn,
        config.database.driver,
    );

    // Build storage layer
    let handles = StorageBuilder::from_config(&config.database).build().await?;
    tracing::info!("Storage initialized");

    if let Some(retention) = config.profiler.retention {
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(retention)?;
        let purged = handles.records.purge(Some(cutoff)).await?;
        tracing::info!(purged, cutoff = %cutoff, "Expired profiling records purged");
    }

    // Initialize collector registry
    let mut registry = CollectorRegistry::builder();
    builtin::register_all_except(&mut registry, &config.profiler.disabled_collectors)?;
    let registry = registry.build();

    let engine = ProfilerEngine::new(
        registry,
        handles.records.clone(),
        ToolbarRouter::new(&config.profiler.base_path),
    )
    .with_inject_toolbar(config.profiler.inject_toolbar);

    let app_state = AppState::new(engine)
        .with_enabled(config.profiler.enabled)
        .with_max_body_bytes(config.profiler.max_body_bytes);

    // Build Axum router
    let app = create_router(app_state, demo_routes());

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!(
        "Profiler available at: http://{}{}",
        addr,
        config.profiler.base_path
    );
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(handles))
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Application routes wrapped by the profiler.
fn demo_routes() -> Router {
    Router::new()
        .route(
            "/",
            get(|| async {
                Html(
                    "<!doctype html><html><head><title>webprofiler</title></head>\
                     <body><h1>Hello from webprofiler</h1>\
                     <p>Open the toolbar at the bottom of the page.</p></body></html>",
                )
            }),
        )
        .route(
            "/json",
            get(|| async { Json(json!({ "message": "JSON responses are never rewritten" })) }),
        )
        .route(
            "/boom",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<html><body><h1>Something broke</h1></body></html>"),
                )
            }),
        )
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(handles: StorageHandles) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }
}

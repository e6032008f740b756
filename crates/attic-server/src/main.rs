//! Attic Server
//!
//! HTTP server for attachments, thumbnails and zip archives.

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use attic_api::AppState;
use attic_attachments::{
    AttachmentService, BlobStore, LocalBlobStore, MemoryBlobStore, MemoryMetaStore, MetaStore,
};
use attic_core::config::{AppConfig, BlobBackend};
use attic_db::{Database, DatabaseConfig, PgMetaStore, PgThumbnailStore};
use attic_thumbnails::{MemoryThumbnailStore, Placeholder, ThumbnailSpecs, ThumbnailStore};

mod health;

use health::{HealthChecker, HealthConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting Attic"
    );

    let backends = Backends::open(&config).await?;

    let specs = ThumbnailSpecs::from_config(&config.thumbnails.specs)
        .context("Invalid thumbnail specs")?;
    let placeholder = Placeholder::load(config.thumbnails.placeholder_path.as_deref())
        .await
        .context("Failed to load placeholder image")?;
    info!(specs = specs.len(), "Thumbnail specs loaded");

    let mut health_checker =
        HealthChecker::new(HealthConfig::default()).with_blob_store(backends.blobs.clone());
    if let Some(ref db) = backends.database {
        health_checker = health_checker.with_database(db.clone());
    }

    let state = AppState::new(
        AttachmentService::new(backends.meta, backends.blobs),
        backends.thumbnails,
        specs,
        placeholder,
        config.cache.max_age_seconds(),
    );

    let app = build_router(
        state,
        Arc::new(health_checker),
        config.server.max_body_size_bytes,
    );

    let addr = config.server_addr();
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = backends.database {
        db.close().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

const DEFAULT_LOG_FILTER: &str = "info,attic_server=debug,attic_api=debug,tower_http=debug";

/// Log filter from the environment variable `var`, after `.env` is loaded
fn log_filter(var: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(log_filter("RUST_LOG"))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Stores selected by configuration
struct Backends {
    meta: Arc<dyn MetaStore>,
    blobs: Arc<dyn BlobStore>,
    thumbnails: Arc<dyn ThumbnailStore>,
    database: Option<Database>,
}

impl Backends {
    async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let blobs: Arc<dyn BlobStore> = match config.storage.backend {
            BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
            BlobBackend::Local => {
                let store = LocalBlobStore::new(&config.storage.local_path);
                store.init().await.with_context(|| {
                    format!("Failed to prepare {}", config.storage.local_path)
                })?;
                Arc::new(store)
            }
        };
        info!(backend = blobs.name(), "Blob store ready");

        let Some(ref settings) = config.database else {
            warn!("DATABASE_URL not set, keeping metadata in memory");
            return Ok(Self {
                meta: Arc::new(MemoryMetaStore::new()),
                blobs,
                thumbnails: Arc::new(MemoryThumbnailStore::new()),
                database: None,
            });
        };

        let db = Database::connect(&DatabaseConfig::from(settings))
            .await
            .context("Failed to connect to database")?;
        db.ensure_schema()
            .await
            .context("Failed to create database schema")?;
        info!("Connected to database");

        Ok(Self {
            meta: Arc::new(PgMetaStore::new(db.pool().clone())),
            blobs,
            thumbnails: Arc::new(PgThumbnailStore::new(db.pool().clone())),
            database: Some(db),
        })
    }
}

/// Build the application router
fn build_router(state: AppState, health: Arc<HealthChecker>, max_body_size: usize) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(health);

    Router::new()
        .merge(health_routes)
        .merge(attic_api::router().with_state(state))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

//! Blobvault - content-addressed blob storage service

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use blobvault_api::{create_router, AppState, MetricsHandle};
use blobvault_auth::{CredentialResolver, DbCredentials, JwtManager};
use blobvault_core::{
    spawn_flush_task, BlobService, CacheConfig, CacheStore, EvictionPolicy,
};
use blobvault_db::{Database, DatabaseStore, NewUser};
use blobvault_remote::{RemoteConfig, RemoteStore};
use blobvault_storage::{
    BlobStore, LocalFileStore, ObjectStoreBackend, ObjectStoreConfig, SizeTieredStore,
};
use config::Config;

/// Blobvault - content-addressed blob storage service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "BLOBVAULT_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "BLOBVAULT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    init_logging(&config.logging.level);

    info!("Starting blobvault v{}", env!("CARGO_PKG_VERSION"));

    // Database
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db_url = format!("sqlite:{}?mode=rwc", config.database.path);
    let db = Database::new(&db_url).await?;

    // First run: create a default user and print its API key once.
    if !db.has_users().await? {
        info!("Creating default user");
        let user = db
            .insert_user(NewUser {
                name: "admin".to_string(),
                quota: None,
            })
            .await?;
        let key = db.create_api_key(user.id, Some("bootstrap".to_string())).await?;
        info!("Default user 'admin' created; API key: {}", key.key);
    }

    // Local storage
    let local: Arc<dyn BlobStore> = match config.storage.backend.as_str() {
        "local" => {
            info!("Using local storage backend: root={}", config.storage.root);
            Arc::new(LocalFileStore::new(&config.storage.root).await?)
        }
        "object" => {
            let object_config = ObjectStoreConfig {
                bucket: config
                    .storage
                    .object
                    .bucket
                    .clone()
                    .unwrap_or_else(|| "blobvault".to_string()),
                region: config
                    .storage
                    .object
                    .region
                    .clone()
                    .unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: config.storage.object.endpoint.clone(),
                access_key_id: config.storage.object.access_key.clone(),
                secret_access_key: config.storage.object.secret_key.clone(),
                allow_http: config.storage.object.allow_http,
            };
            info!("Using object storage backend: bucket={}", object_config.bucket);
            Arc::new(ObjectStoreBackend::new(object_config)?)
        }
        _ => {
            // Small blobs in the database, big ones on disk.
            info!(
                "Using size-tiered storage backend: root={}, threshold={}",
                config.storage.root, config.storage.small_blob_threshold
            );
            let small = Arc::new(DatabaseStore::new(db.clone()));
            let big = Arc::new(LocalFileStore::new(&config.storage.root).await?);
            Arc::new(SizeTieredStore::new(
                small,
                big,
                config.storage.small_blob_threshold,
            ))
        }
    };

    // With an origin configured the local storage becomes a cache in front
    // of the remote server.
    let store: Arc<dyn BlobStore> = match &config.origin {
        Some(origin) => {
            info!("Caching for origin {}", origin.url);
            let mut remote_config = RemoteConfig::new(origin.url.clone());
            remote_config.api_key = origin.api_key.clone();
            let remote = Arc::new(RemoteStore::new(remote_config)?);

            let cache = Arc::new(CacheStore::new(
                local,
                remote,
                db.clone(),
                CacheConfig {
                    max_size: config.cache.max_size,
                    policy: EvictionPolicy::from_str(&config.cache.policy).unwrap_or_default(),
                    ..CacheConfig::default()
                },
            ));
            let _flush_handle = spawn_flush_task(cache.clone(), config.cache.flush_interval_secs);
            cache
        }
        None => local,
    };

    let service = Arc::new(BlobService::new(db.clone(), store));

    let jwt = JwtManager::new(&config.auth.jwt_secret, config.auth.token_expiry_hours);
    let resolver: Arc<dyn CredentialResolver> = Arc::new(DbCredentials::new(db.clone(), jwt));

    let state = AppState::new(db, service, resolver);

    let metrics_handle = init_metrics();
    let app = create_router(state, metrics_handle.map(Arc::new)).layer(TraceLayer::new_for_http());

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Initialize Prometheus metrics
fn init_metrics() -> Option<MetricsHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics enabled at /metrics");

            metrics::describe_counter!(
                "blobvault_cache_hits_total",
                "Total number of cache hits"
            );
            metrics::describe_counter!(
                "blobvault_cache_misses_total",
                "Total number of cache misses"
            );
            metrics::describe_counter!(
                "blobvault_cache_evictions_total",
                "Total number of cache evictions"
            );
            metrics::describe_counter!(
                "blobvault_health_checks_total",
                "Total number of health checks"
            );

            Some(handle)
        }
        Err(e) => {
            tracing::warn!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}

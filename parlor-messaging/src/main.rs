use axum::routing::get;
use std::sync::Arc;

use parlor_messaging::config::{AppConfig, StorageBackend};
use parlor_messaging::storage::BlobStore;
use parlor_messaging::{build_router, db, AppState};
use parlor_shared::clients::minio::MinioClient;
use parlor_shared::middleware::{init_metrics, init_tracing, metrics_middleware};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("parlor-messaging");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = db::init_pool(&config.database_url, config.db_pool_size)?;

    let storage = match config.storage_backend {
        StorageBackend::Local => {
            tracing::info!(dir = %config.uploads_dir, "storing uploads on local disk");
            BlobStore::local(&config.uploads_dir)
        }
        StorageBackend::Minio => BlobStore::Minio(MinioClient::new(&config.minio_settings()).await),
    };

    let metrics_handle = init_metrics()?;

    tracing::info!(
        policy = ?config.delete_policy(),
        max_upload_bytes = config.max_upload_bytes,
        "configuration loaded"
    );

    let state = Arc::new(AppState { db: pool, config, storage });

    let app = build_router(state)
        .route("/metrics", get(move || std::future::ready(metrics_handle.render())))
        .layer(axum::middleware::from_fn(metrics_middleware));

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "parlor-messaging starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

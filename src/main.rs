use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::ObjectStoreBackend;

use services::{
    backend::{LocalStore, StorageBackends},
    catalog::{self, Catalog},
    object_store::{DiskObjectStore, ObjectStoreClient},
    s3_store::S3ObjectStore,
    static_file_service::StaticFileService,
    upload::UploadCredentialIssuer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        object_store = ?cfg.object_store,
        "Starting static-files"
    );

    // --- Ensure storage directories exist ---
    let mut dirs = vec![&cfg.storage_dir];
    if cfg.object_store == ObjectStoreBackend::Disk {
        dirs.push(&cfg.object_store_dir);
    }
    for dir in dirs {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)?;
            tracing::info!("Created storage directory at {}", dir);
        }
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // SQLx does not create the database file by itself
    match fs::OpenOptions::new().create(true).append(true).open(db_path) {
        Ok(_) => tracing::debug!("File can be created/opened successfully."),
        Err(e) => tracing::warn!("Failed to open file manually: {}", e),
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    catalog::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let object_store: Arc<dyn ObjectStoreClient> = match cfg.object_store {
        ObjectStoreBackend::S3 => Arc::new(S3ObjectStore::new(cfg.s3_endpoint.clone())),
        ObjectStoreBackend::Disk => {
            tracing::warn!(
                "Using the disk object store at {}; signed uploads are disabled",
                cfg.object_store_dir
            );
            Arc::new(DiskObjectStore::new(cfg.object_store_dir.clone()))
        }
    };
    let service = StaticFileService::new(
        Catalog::new(db.clone()),
        StorageBackends::new(LocalStore::new(cfg.storage_dir.clone()), object_store.clone()),
        UploadCredentialIssuer::new(object_store, cfg.uploader_url.clone()),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

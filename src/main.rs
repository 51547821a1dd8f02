use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::Task,
    services::{document_service::DocumentService, file_store::FileStore},
};

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_helpers;
mod views;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + maintenance task ---
    let (cfg, task) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting edital-panel with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        tokio::fs::create_dir_all(&cfg.storage_dir).await?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection + schema ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    let service = DocumentService::new(db.clone(), FileStore::new(&cfg.storage_dir));

    match task {
        Task::Migrate => {
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }
        Task::Reconcile { prune } => {
            let report = service.reconcile(prune).await?;
            for name in &report.orphaned_files {
                tracing::warn!("orphaned file without a document row: {}", name);
            }
            for doc in &report.missing_files {
                tracing::warn!(
                    "document {} ({}) has no file on disk: {}",
                    doc.id,
                    doc.original_name,
                    doc.stored_name
                );
            }
            tracing::info!(
                orphaned = report.orphaned_files.len(),
                missing = report.missing_files.len(),
                pruned = report.pruned,
                consistent = report.is_consistent(),
                "Reconciliation complete."
            );
            return Ok(());
        }
        Task::Serve => {}
    }

    // --- Build router ---
    let app: Router = routes::routes::app(service);

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

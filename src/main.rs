use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use upload_store::{
    config::{AppConfig, Command},
    routes,
    services::{
        local_client::LocalObjectClient,
        object_client::SharedClient,
        reconcile::{Catalog, InMemoryCatalog, ReconciliationScanner, ScanReport},
        s3_store::{S3Store, StoreResult},
    },
};

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::info!(
        "upload-store: bucket {} (folder {:?}, tenant {:?}), objects in {}, metadata in {}",
        cfg.store.bucket_name,
        cfg.store.bucket_folder,
        cfg.store.tenant,
        cfg.client.storage_dir.display(),
        cfg.client.database_path.display()
    );

    // --- Open the local object service (creates dirs and schema) ---
    let client = LocalObjectClient::open(cfg.client.clone())
        .await
        .context("opening local object store")?;

    match command {
        Command::Migrate => {
            tracing::info!("Database migration complete.");
            Ok(())
        }
        Command::Serve => serve(&cfg, client).await,
        Command::Lifecycle { grace_days } => {
            let store = S3Store::new(Arc::new(client) as SharedClient, cfg.store.clone());
            let days = grace_days.unwrap_or(cfg.store.tombstone_grace_days);
            store.tombstones().purge_tombstone(days).await?;
            Ok(())
        }
        Command::Reconcile {
            uploads_catalog,
            optimized_catalog,
            skip_optimized,
        } => {
            let store = S3Store::new(Arc::new(client) as SharedClient, cfg.store.clone());
            let uploads = InMemoryCatalog::from_json_file("uploads", &uploads_catalog).await?;
            let optimized = match optimized_catalog {
                Some(path) if !skip_optimized => {
                    Some(InMemoryCatalog::from_json_file("optimized", &path).await?)
                }
                _ => None,
            };

            let summary = ReconciliationScanner::new(&store)
                .run(&uploads, optimized.as_ref().map(|c| c as &dyn Catalog))
                .await;
            print_report("uploads", &summary.uploads);
            if let Some(report) = &summary.optimized {
                print_report("optimized", report);
            }
            Ok(())
        }
    }
}

async fn serve(cfg: &AppConfig, client: LocalObjectClient) -> Result<()> {
    // --- Background lifecycle expiry ---
    let purger = client.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = purger.purge_expired(Utc::now()).await {
                tracing::warn!("lifecycle purge failed: {}", err);
            }
        }
    });

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(client);

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

/// Missing URLs one per line, then a summary line.
fn print_report(name: &str, outcome: &StoreResult<ScanReport>) {
    match outcome {
        Ok(report) => {
            for record in &report.missing {
                println!("{}", record.url);
            }
            println!(
                "{}: {} records missing ({} objects listed, {} verified)",
                name,
                report.missing_count(),
                report.listed,
                report.verified
            );
        }
        Err(err) => tracing::error!("{}: scan aborted: {}", name, err),
    }
}

//! musync - album year resolution and library sync
//!
//! Resolves missing or wrong release years for a catalog export and keeps
//! a snapshot of the catalog so unchanged libraries are not rescanned.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use musync_common::config::resolve_root_folder;
use musync_engine::config::{CONFIG_ENV_VAR, ROOT_FOLDER_ENV_VAR};
use musync_engine::library::JsonFileLibrary;
use musync_engine::providers::build_clients;
use musync_engine::{SyncConfig, SyncPipeline};

/// Command-line arguments for musync
#[derive(Parser, Debug)]
#[command(name = "musync")]
#[command(about = "Resolve album release years and keep the library snapshot current")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Folder holding the cache database and snapshot
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Catalog export (JSON) to read and update
    #[arg(long)]
    catalog: PathBuf,

    /// Ignore any snapshot and resolve the whole catalog
    #[arg(long)]
    full_rescan: bool,

    /// Print pending-verification albums and exit
    #[arg(long)]
    list_pending: bool,

    /// Drop every pending-verification record and exit
    #[arg(long)]
    clear_pending: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = musync_common::config::resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = SyncConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    musync_common::logging::init_tracing(&config.logging).context("Failed to initialise logging")?;

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV_VAR,
        config.root_folder.as_deref(),
    );
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    info!("Starting musync {}", env!("CARGO_PKG_VERSION"));
    info!("Root folder: {}", root_folder.display());

    let library = Arc::new(
        JsonFileLibrary::open(&args.catalog)
            .await
            .context("Failed to open catalog")?,
    );
    let clients = build_clients(&config)?;

    let cancel = CancellationToken::new();
    let pipeline = SyncPipeline::open(&config, &root_folder, library, clients, cancel.clone())
        .await
        .context("Failed to open cache stores")?;

    if args.list_pending {
        for record in pipeline.pending().list().await? {
            println!(
                "{}\t{}\tattempts={}\tlast_error={}\tlast_attempt={}",
                record.artist, record.album, record.attempt_count, record.last_error, record.last_attempt_at
            );
        }
        return Ok(());
    }
    if args.clear_pending {
        let removed = pipeline.pending().clear().await?;
        info!("Cleared {} pending record(s)", removed);
        return Ok(());
    }

    tokio::spawn(cancel_on_signal(cancel));

    let report = pipeline.run(args.full_rescan).await.context("Sync run failed")?;
    if report.cancelled {
        warn!("Run interrupted before all albums were processed");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Cancel the run on Ctrl+C or SIGTERM; in-flight albums finish
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing in-flight albums"),
        _ = terminate => info!("Received terminate signal, finishing in-flight albums"),
    }
    cancel.cancel();
}

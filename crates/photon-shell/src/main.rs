//! Photon Shell - host process for Photon OS.
//!
//! Runs the shell document with a persistent store and serves the HTTP ingress
//! that in-world devices post their messages to.

use anyhow::{Context, Result};
use clap::Parser;
use photon_core::config::ShellConfig;
use photon_core::models::CurrentUser;
use photon_core::transport::Origin;
use photon_shell::{start_ingress, IngressState, RealtimeHub, Shell, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "photon-shell")]
#[command(about = "Host shell for Photon OS")]
struct Args {
    /// Ingress port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind the ingress to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// SQLite database path (defaults to the user data directory)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Id of the signed-in user (defaults to a fresh one)
    #[arg(long)]
    user_id: Option<String>,

    /// Display name of the signed-in user
    #[arg(long, default_value = "Resident")]
    display_name: String,

    /// Extra origin to trust, may be repeated
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Shared secret required on ingress requests
    #[arg(long)]
    ingress_token: Option<String>,
}

fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("No user data directory on this platform")?;
    Ok(data_dir
        .join(ShellConfig::DATA_DIR_NAME)
        .join(ShellConfig::DATABASE_FILENAME))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Photon Shell");

    let db_path = match args.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!("Database: {}", db_path.display());
    let store = SqliteStore::open(&db_path)?;

    let user_id = args
        .user_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let hub = RealtimeHub::new();

    let mut builder = Shell::builder()
        .store(store)
        .hub(hub.clone())
        .user(CurrentUser::new(user_id, args.display_name));
    for origin in &args.allow_origins {
        builder = builder.allow_origin(Origin::parse(origin)?);
    }
    let shell = builder.build()?;

    let ingress = Arc::new(IngressState {
        hub,
        store: shell.state().store().clone(),
        token: args.ingress_token,
    });
    let (addr, _server) = start_ingress(ingress, &args.host, args.port).await?;

    // Print port for the embedding process to read (intentional stdout)
    println!("INGRESS_PORT={}", addr.port());

    info!("Shell {} ready; ingress on {}", shell.window_id(), addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}

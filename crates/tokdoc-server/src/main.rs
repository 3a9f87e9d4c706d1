mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tokdoc_db::Database;
use tokdoc_engine::{AccessController, FileStore, ServerState};
use tracing::info;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokdoc_server=debug,tokdoc_engine=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.server_key_is_placeholder() {
        eprintln!("FATAL: TOKDOC_SERVER_KEY is unset or still a placeholder.");
        eprintln!("       Access keys are derived from it; set it in your .env file and restart.");
        std::process::exit(1);
    }

    // Init DB and storage
    let db = Database::open(&config.db_path)?;
    let files = FileStore::new(config.storage_dir.clone()).await?;

    let state = ServerState::new(
        AccessController::new(config.server_key),
        Arc::new(db),
        files,
        config.limits,
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("TOKDOC server listening on {}", addr);
    info!(
        "Limits: {} byte messages, {} byte uploads",
        config.limits.max_message_bytes, config.limits.max_upload_bytes
    );

    // Open sessions are dropped with the runtime.
    tokio::select! {
        _ = tokdoc_engine::serve(listener, state) => {}
        _ = shutdown_signal() => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

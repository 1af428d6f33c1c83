//! downlog server binary.
//!
//! Serves host log files as zip downloads over HTTP(S).

use clap::Parser;
use downlog_server::{Cli, LogServer, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match ServerConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let scheme = if config.tls.is_some() { "https" } else { "http" };
    info!("Starting downlog on {}", config.bind_addr);
    for category in config.categories.iter() {
        info!(
            "  {}://{}{}/{}  ->  {}",
            scheme,
            config.bind_addr,
            config.api_base(),
            category.name(),
            category.root().display()
        );
    }
    match config.download_limit {
        Some(limit) => info!("  Download limit: {} bytes", limit),
        None => info!("  Download limit: none"),
    }

    let server = LogServer::new(config);

    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

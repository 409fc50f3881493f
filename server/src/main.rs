use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::AppState;
use server::handlers::{self, http::routes::build_api_router};
use shared::config::{load_config, validate_config};
use shared::types::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "forum-server", about = "Forum content server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "FORUM_CONFIG")]
    config: Option<String>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("Failed to load {}", path))?,
        None => {
            warn!("No config file given, using defaults");
            let config = AppConfig::default();
            validate_config(&config).context("Default configuration is invalid")?;
            config
        }
    };

    let addr = match args.port {
        Some(port) => format!("{}:{}", config.server.bind, port),
        None => config.server.addr(),
    };

    let state = AppState::build(config).await?;
    let router = Arc::new(build_api_router());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    handlers::serve(listener, state.clone(), router, shutdown).await?;

    state.shutdown().await;
    info!("Server stopped");
    Ok(())
}

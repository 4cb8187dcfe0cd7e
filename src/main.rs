//! RestGate Server
//!
//! Binary entry point for running the REST gateway.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use restgate::{load_config, RestGateServer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "restgate")]
#[command(about = "PostgREST-compatible REST gateway for PostgreSQL", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "RESTGATE_CONFIG", default_value = "restgate.toml")]
    config: PathBuf,

    /// Database URL, overriding the configuration file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    match args.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }

    info!("RestGate v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }

    let server = RestGateServer::new(config).await?;

    // Handle shutdown signals
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        () = shutdown => {}
    }

    server.shutdown().await;
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront::config::{LoggingConfig, StorefrontConfig};
use storefront::http::HttpServer;
use storefront::ratelimit::{RateLimitGate, Sweeper};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Catalog site server with per-client rate limiting", version)]
struct Args {
    /// Path to the YAML configuration file (optional)
    #[arg(short, long, default_value = "config/storefront.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = StorefrontConfig::load(&args.config)?;
    init_tracing(&config.logging);

    info!("Starting Storefront");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        bind_addr = %config.server.bind_addr,
        config_path = %args.config.display(),
        "Configuration loaded"
    );

    let settings = config.rate_limiting.settings()?;
    let gate = Arc::new(RateLimitGate::new(settings));
    info!(
        max_requests = settings.max_requests,
        window_secs = settings.window.as_secs(),
        sweep_interval_secs = settings.sweep_interval.as_secs(),
        "Rate limit gate initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::spawn(Arc::clone(&gate), settings.sweep_interval, shutdown_rx);

    let server = HttpServer::new(
        config.server.bind_addr,
        gate,
        config.server.trust_forwarded_for,
    );

    // The sweeper is told to stop as soon as the server starts draining.
    server
        .serve_with_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    sweeper.join().await?;

    info!("Storefront stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

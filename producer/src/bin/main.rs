//! Random point producer

use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use producer::{Producer, ProducerConfig};
use tokio::signal;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind (defaults to PRODUCER_HOST or 127.0.0.1)
    #[clap(long)]
    host: Option<String>,

    /// Port to bind (defaults to PRODUCER_PORT or 65432)
    #[clap(short, long)]
    port: Option<u16>,

    /// Milliseconds between batches
    #[clap(short, long)]
    interval_ms: Option<u64>,

    /// Points per batch
    #[clap(short, long)]
    batch_size: Option<usize>,

    /// Close each connection after this many batches
    #[clap(short, long)]
    count: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize tracing with debug level if DEBUG=1 in .env
    let env_debug = std::env::var("DEBUG").unwrap_or_else(|_| "0".to_string());
    let log_level = if env_debug == "1" { Level::DEBUG } else { Level::INFO };

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .finish();

    // Only set the global subscriber if it hasn't been set already
    if tracing::subscriber::set_global_default(subscriber).is_ok() && env_debug == "1" {
        debug!("Debug logging enabled");
    }

    let mut config = ProducerConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ms) = args.interval_ms {
        config.interval = Duration::from_millis(ms);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.count.is_some() {
        config.batch_limit = args.count;
    }

    let producer = Producer::bind(config).await?;
    info!(
        "Sending {} points every {:?}",
        producer.config().batch_size,
        producer.config().interval
    );

    producer.serve(shutdown_signal()).await?;

    info!("Shutting down");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use common::{ConnectionState, ExportFormat};
use data_feed::{DataFeed, FeedConfig};
use dotenv::dotenv;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Headless live data client: streams batches and exports them on exit
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Producer host (defaults to FEED_HOST or 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Producer port (defaults to FEED_PORT or 65432)
    #[arg(short, long)]
    port: Option<u16>,

    /// Export format written on exit
    #[arg(short, long, default_value = "json")]
    format: ExportFormat,

    /// Export path; defaults to a timestamped file in the export directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for timestamped exports
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Maximum number of retained points
    #[arg(long)]
    max_points: Option<usize>,

    /// Connect timeout in milliseconds
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    let cli = Cli::parse();

    // DEBUG=1 in .env overrides the requested level
    let level = if std::env::var("DEBUG").map(|v| v == "1").unwrap_or(false) {
        "debug".to_string()
    } else {
        cli.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::new(format!("data_feed={level},frame_decoder={level},feed_client={level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = FeedConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.export_dir {
        config.export_dir = dir;
    }
    if let Some(max_points) = cli.max_points {
        config.max_series_len = max_points;
    }
    if let Some(ms) = cli.connect_timeout_ms {
        config.connect_timeout = Some(Duration::from_millis(ms));
    }

    let feed = DataFeed::new(config)?;
    feed.subscribe(|points| {
        info!("Received {} points", points.len());
        Ok::<(), std::convert::Infallible>(())
    });

    feed.start().await?;
    info!("Streaming from {}. Press Ctrl+C to stop and export.", feed.config().address());

    let mut state = feed.state_changes();
    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                error!("Error waiting for Ctrl+C: {}", err);
            }
            info!("Shutting down feed client...");
        }
        _ = state.wait_for(|s| *s == ConnectionState::Disconnected) => {
            info!("Connection ended");
        }
    }

    feed.stop().await;

    let path = feed.save(cli.format, cli.output.as_deref())?;
    info!("Exported {} points to {}", feed.len(), path.display());

    Ok(())
}

//! Configuration for the producer

use std::env;
use std::ops::Range;
use std::time::Duration;

use common::{Error, Result};

/// Configuration for the producer
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Address to bind
    pub host: String,
    /// Port to bind, 0 picks a free one
    pub port: u16,
    /// Delay between batches
    pub interval: Duration,
    /// Points per batch
    pub batch_size: usize,
    /// Close each connection after this many batches
    pub batch_limit: Option<u64>,
    /// Range of generated x values
    pub x_range: Range<f64>,
    /// Range of generated y values
    pub y_range: Range<f64>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            host: env::var("PRODUCER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PRODUCER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(65432),
            interval: env::var("BATCH_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(1)),
            batch_size: env::var("BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            batch_limit: env::var("BATCH_LIMIT").ok().and_then(|s| s.parse().ok()),
            x_range: 0.0..5.0,
            y_range: -20.0..80.0,
        }
    }
}

impl ProducerConfig {
    /// Create a new configuration using environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// `host:port` string to bind
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that generation parameters are usable
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::ConfigurationError("interval must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::ConfigurationError("batch_size must be at least 1".to_string()));
        }
        if self.batch_limit == Some(0) {
            return Err(Error::ConfigurationError("batch_limit must be at least 1".to_string()));
        }
        for (name, range) in [("x_range", &self.x_range), ("y_range", &self.y_range)] {
            if !(range.start < range.end) || !range.start.is_finite() || !range.end.is_finite() {
                return Err(Error::ConfigurationError(format!(
                    "{} must be a finite, non-empty range, got {:?}",
                    name, range
                )));
            }
        }
        Ok(())
    }
}

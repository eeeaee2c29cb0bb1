//! Configuration for the data feed

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use common::{Error, Result};
use frame_decoder::DEFAULT_MAX_FRAME_BYTES;

/// Default producer host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default producer port
pub const DEFAULT_PORT: u16 = 65432;
/// Default retained series length
pub const DEFAULT_MAX_SERIES_LEN: usize = 10_000;
/// Default socket read size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Configuration for the data feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Producer host name or address
    pub host: String,
    /// Producer port
    pub port: u16,
    /// Directory for default-path exports
    pub export_dir: PathBuf,
    /// File name prefix for default-path exports
    pub export_prefix: String,
    /// Maximum retained series length
    pub max_series_len: usize,
    /// Maximum bytes buffered without a complete frame
    pub max_frame_bytes: usize,
    /// Connect timeout, `None` waits as long as the OS does
    pub connect_timeout: Option<Duration>,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: env::var("FEED_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("FEED_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            export_dir: env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            export_prefix: env::var("EXPORT_PREFIX").unwrap_or_else(|_| "output".to_string()),
            max_series_len: env::var("MAX_SERIES_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_SERIES_LEN),
            max_frame_bytes: env::var("MAX_FRAME_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_FRAME_BYTES),
            connect_timeout: env::var("CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl FeedConfig {
    /// Create a new configuration using environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Configuration pointing at a specific producer
    pub fn for_address(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` string used for resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::ConfigurationError("host must not be empty".to_string()));
        }
        if self.max_series_len == 0 {
            return Err(Error::ConfigurationError("max_series_len must be at least 1".to_string()));
        }
        if self.max_frame_bytes == 0 {
            return Err(Error::ConfigurationError("max_frame_bytes must be at least 1".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::ConfigurationError("read_buffer_size must be at least 1".to_string()));
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(Error::ConfigurationError("connect_timeout must be positive".to_string()));
        }
        Ok(())
    }
}

//! Connection lifecycle state

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the feed's stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection and no receive loop
    #[default]
    Disconnected,
    /// `start()` is dialling the producer
    Connecting,
    /// Receive loop is running
    Streaming,
    /// `stop()` is tearing the session down
    Closing,
}

impl ConnectionState {
    /// Whether a session currently owns the connection
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Streaming)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

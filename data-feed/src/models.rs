//! Feed diagnostics models

use frame_decoder::FrameError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier handed out by `subscribe`, used to unsubscribe
pub type SubscriptionId = Uuid;

/// Non-fatal report published on the feed's diagnostics channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Connection established and receive loop started
    Connected {
        /// Remote address
        peer: String,
    },
    /// A frame was corrupt or had the wrong shape and was dropped
    Framing {
        /// Decoder explanation
        reason: String,
    },
    /// The decoder buffer hit its limit and was reset
    FrameTooLarge {
        /// Bytes held when the limit was hit
        buffered: usize,
        /// Configured limit
        limit: usize,
    },
    /// A batch callback returned an error or panicked
    SubscriberFailed {
        /// Failing subscription
        id: SubscriptionId,
        /// Error text or panic message
        reason: String,
    },
    /// The receive loop ended on a read error
    Transport {
        /// Socket error text
        reason: String,
    },
    /// The producer closed the connection
    PeerClosed,
    /// The receive loop ended because `stop()` was called
    Stopped,
}

impl Diagnostic {
    /// Whether this report ends the receive loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, Diagnostic::Transport { .. } | Diagnostic::PeerClosed | Diagnostic::Stopped)
    }
}

impl From<FrameError> for Diagnostic {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Framing(reason) => Diagnostic::Framing { reason },
            FrameError::TooLarge { buffered, limit } => Diagnostic::FrameTooLarge { buffered, limit },
        }
    }
}

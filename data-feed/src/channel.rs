//! Channel for feed diagnostics distribution

use std::sync::Mutex;

use crossbeam_channel::{self, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::Diagnostic;

/// Reports buffered per listener before new ones are dropped
pub const DIAGNOSTICS_CAPACITY: usize = 256;

/// Subscription entry
struct SubscriptionEntry {
    /// Sender channel
    sender: Sender<Diagnostic>,
    /// Subscription ID
    id: Uuid,
}

/// Fan-out of diagnostics to any number of listeners
///
/// Every report is also logged, so a feed without listeners still leaves a
/// trace of dropped frames and connection failures.
pub struct DiagnosticsChannel {
    /// Live listeners
    senders: Mutex<Vec<SubscriptionEntry>>,
}

impl Default for DiagnosticsChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsChannel {
    /// Create a new diagnostics channel
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener
    pub fn subscribe(&self) -> Receiver<Diagnostic> {
        let (sender, receiver) = crossbeam_channel::bounded(DIAGNOSTICS_CAPACITY);
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.push(SubscriptionEntry {
            sender,
            id: Uuid::new_v4(),
        });
        receiver
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Log a report and deliver it to every listener
    pub fn publish(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Connected { peer } => info!(%peer, "Feed connected"),
            Diagnostic::Framing { reason } => warn!(%reason, "Dropped corrupt frame"),
            Diagnostic::FrameTooLarge { buffered, limit } => {
                warn!(buffered, limit, "Dropped oversized frame")
            }
            Diagnostic::SubscriberFailed { id, reason } => warn!(%id, %reason, "Batch subscriber failed"),
            Diagnostic::Transport { reason } => warn!(%reason, "Feed transport error"),
            Diagnostic::PeerClosed => info!("Producer closed the connection"),
            Diagnostic::Stopped => info!("Feed stopped"),
        }

        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.retain(|entry| match entry.sender.try_send(diagnostic.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                if dropped.is_terminal() {
                    warn!(listener = %entry.id, "Diagnostics listener is full, end-of-stream report dropped");
                } else {
                    debug!(listener = %entry.id, "Diagnostics listener is full, report dropped");
                }
                true
            }
            // Receiver was dropped
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

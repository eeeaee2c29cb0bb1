//! Batch subscribers

use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use common::Point;
use uuid::Uuid;

use crate::channel::DiagnosticsChannel;
use crate::models::{Diagnostic, SubscriptionId};

type BatchCallback = Arc<dyn Fn(&[Point]) -> Result<(), String> + Send + Sync>;

/// Subscription entry
struct SubscriptionEntry {
    /// Subscription ID
    id: SubscriptionId,
    /// Callback invoked with each appended batch
    callback: BatchCallback,
}

/// Ordered set of batch callbacks
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: RwLock<Vec<SubscriptionEntry>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; callbacks run in registration order
    pub fn subscribe<F, E>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[Point]) -> Result<(), E> + Send + Sync + 'static,
        E: Display,
    {
        let id = Uuid::new_v4();
        let callback: BatchCallback = Arc::new(move |points: &[Point]| callback(points).map_err(|e| e.to_string()));
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(SubscriptionEntry { id, callback });
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let initial_len = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() < initial_len
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback with `points`
    ///
    /// The list is copied out of the lock first so callbacks may subscribe or
    /// unsubscribe. Errors and panics are reported on `diagnostics` and never
    /// stop delivery to the remaining callbacks.
    pub fn notify(&self, points: &[Point], diagnostics: &DiagnosticsChannel) {
        let callbacks: Vec<(SubscriptionId, BatchCallback)> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|entry| (entry.id, entry.callback.clone()))
            .collect();

        for (id, callback) in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(points)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(reason)) => reason,
                Err(payload) => panic_message(payload.as_ref()),
            };
            diagnostics.publish(Diagnostic::SubscriberFailed { id, reason });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

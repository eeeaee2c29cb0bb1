//! Common types and utilities for the live plot feed
//!
//! This library contains the shared point model, connection state, export
//! formats and the unified error type used by the frame decoder, the data feed
//! and the producer.

pub mod error;
pub mod model;

/// Re-export important types
pub use error::{ConnectFailure, Error, ErrorExt, Result};
pub use model::{Batch, ConnectionState, ExportDocument, ExportFormat, Point};

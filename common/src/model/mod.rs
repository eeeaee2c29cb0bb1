//! Domain models for the live plot feed

pub mod point;
pub mod connection;
pub mod export;

pub use connection::ConnectionState;
pub use export::{ExportDocument, ExportFormat};
pub use point::{Batch, Point};

//! Live data feed for streaming point batches
//!
//! [`DataFeed`] owns the connection to a producer, decodes the JSON batches it
//! pushes into a bounded [`Series`], notifies subscribers and exports the
//! accumulated points to JSON or YAML.

mod service;
mod models;
mod subscription;
pub mod channel;
pub mod config;
pub mod export;
pub mod series;

pub use config::FeedConfig;
pub use models::{Diagnostic, SubscriptionId};
pub use series::Series;
pub use service::DataFeed;
pub use subscription::SubscriberRegistry;

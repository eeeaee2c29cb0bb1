//! Random point batch producer
//!
//! Binds one TCP listener, serves one client at a time and pushes a JSON array
//! of random points every interval. Writes carry no delimiter or length
//! prefix; consumers recover batch boundaries from the JSON structure.

mod server;
pub mod config;

pub use config::ProducerConfig;
pub use server::Producer;

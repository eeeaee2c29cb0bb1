//! Incremental JSON frame decoder
//!
//! The producer writes bare JSON documents back to back with no delimiter or
//! length prefix, and TCP is free to split or coalesce those writes. This crate
//! recovers document boundaries structurally so the feed never has to assume
//! that one read equals one message.

mod decoder;
mod frame;

pub use decoder::{FrameDecoder, Frames, DEFAULT_MAX_FRAME_BYTES};
pub use frame::{Frame, FrameError};

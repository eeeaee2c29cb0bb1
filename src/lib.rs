// This is a metapackage for end-to-end tests
// Re-export crates as modules

pub use common;
pub use data_feed;
pub use frame_decoder;
pub use producer;

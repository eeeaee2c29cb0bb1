//! Decoded frames and frame-level errors

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Errors raised while cutting frames out of the byte stream
///
/// Both variants are frame-level: the decoder has already discarded the
/// offending bytes and can keep decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A balanced frame was not valid JSON, stray bytes appeared between
    /// frames, or a frame did not have the expected shape
    #[error("{0}")]
    Framing(String),

    /// The buffer outgrew its limit without completing a frame
    #[error("{buffered} bytes buffered without a complete frame (limit {limit})")]
    TooLarge {
        /// Bytes held when the limit was hit
        buffered: usize,
        /// Configured limit
        limit: usize,
    },
}

impl From<FrameError> for common::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Framing(reason) => common::Error::Framing(reason),
            FrameError::TooLarge { buffered, limit } => common::Error::FrameTooLarge { buffered, limit },
        }
    }
}

/// One complete JSON document recovered from the stream
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    value: Value,
    len: usize,
}

impl Frame {
    /// Parse a balanced byte range as JSON
    pub(crate) fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        let value = serde_json::from_slice(raw)
            .map_err(|e| FrameError::Framing(format!("invalid JSON in {}-byte frame: {}", raw.len(), e)))?;
        Ok(Self { value, len: raw.len() })
    }

    /// Number of wire bytes the frame occupied
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a frame holds at least its enclosing brackets
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The parsed document
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Convert the document into a typed value
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, FrameError> {
        serde_json::from_value(self.value)
            .map_err(|e| FrameError::Framing(format!("unexpected frame shape: {}", e)))
    }
}

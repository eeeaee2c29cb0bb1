//! Bracket-depth frame scanner

use tracing::{debug, warn};

use crate::frame::{Frame, FrameError};

/// Default cap on bytes buffered without a complete frame (1 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Splits an unbounded byte stream into complete JSON arrays or objects
///
/// Bytes are appended with [`FrameDecoder::feed`] as they arrive from the
/// transport. The scanner keeps its position and nesting state between calls,
/// so each byte is inspected once no matter how the stream was chunked.
/// Brackets inside string literals are ignored and `\"` / `\\` escapes are
/// honoured.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Received bytes; `buf[start..]` is not yet handed out as frames
    buf: Vec<u8>,
    /// Offset of the first unconsumed byte, compacted away on the next feed
    start: usize,
    /// Next byte to scan; `buf[start..cursor]` belongs to the open frame
    cursor: usize,
    /// Bracket nesting of the open frame, 0 between frames
    depth: usize,
    /// Scanner is inside a string literal
    in_string: bool,
    /// Previous byte was a backslash inside a string literal
    escaped: bool,
    /// A run of stray bytes is being discarded and has already been reported
    skipping: bool,
    /// Limit on bytes buffered without a complete frame
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    /// Create a decoder that gives up on a frame once `max_frame_bytes` are
    /// buffered without completing it
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            cursor: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            skipping: false,
            max_frame_bytes: max_frame_bytes.max(1),
        }
    }

    /// Configured buffer limit
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Bytes currently held
    pub fn buffered_len(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Whether no bytes are held
    pub fn is_empty(&self) -> bool {
        self.buffered_len() == 0
    }

    /// Drop buffered bytes and scan state
    pub fn reset(&mut self) {
        self.clear_buffer();
        self.skipping = false;
    }

    /// Append received bytes and return the frames they complete
    ///
    /// The returned iterator is lazy: frames are cut out of the buffer only
    /// as it is advanced. Bytes left over when it is dropped stay buffered for
    /// the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.compact();
        self.buf.extend_from_slice(bytes);
        Frames { decoder: self }
    }

    /// Cut the next complete frame out of the buffer
    ///
    /// Returns `Ok(None)` when more bytes are needed. Errors are frame-level:
    /// the offending bytes are already discarded when the error is returned
    /// and the next call carries on with whatever follows them.
    pub fn decode_next(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.depth == 0 {
            self.skip_to_frame_start()?;
            if self.is_empty() {
                return Ok(None);
            }
        }

        while self.cursor < self.buf.len() {
            let byte = self.buf[self.cursor];
            self.cursor += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'[' | b'{' => self.depth += 1,
                b']' | b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return self.take_frame().map(Some);
                    }
                }
                _ => {}
            }
        }

        if self.buffered_len() > self.max_frame_bytes {
            let buffered = self.buffered_len();
            warn!(buffered, limit = self.max_frame_bytes, "Frame exceeded buffer limit, discarding");
            self.clear_buffer();
            // The rest of the runaway frame is still on its way; it belongs to this report
            self.skipping = true;
            return Err(FrameError::TooLarge {
                buffered,
                limit: self.max_frame_bytes,
            });
        }

        Ok(None)
    }

    /// Drop inter-frame whitespace and junk so the open frame starts at `[`/`{`
    ///
    /// A run of stray bytes is reported once, however many feeds it spans.
    fn skip_to_frame_start(&mut self) -> Result<(), FrameError> {
        let pending = &self.buf[self.start..];
        let whitespace = pending.iter().take_while(|b| b.is_ascii_whitespace()).count();
        let pending = &pending[whitespace..];

        let (stray, found) = match pending.iter().position(|b| matches!(b, b'[' | b'{')) {
            Some(at) => (at, true),
            None => (pending.len(), false),
        };
        self.start += whitespace + stray;
        self.cursor = self.start;

        if stray == 0 {
            if found {
                self.skipping = false;
            }
            return Ok(());
        }

        let reported = self.skipping;
        self.skipping = !found;
        debug!(stray, "Discarded bytes between frames");
        if reported {
            Ok(())
        } else {
            Err(FrameError::Framing(format!("{} unexpected byte(s) between frames", stray)))
        }
    }

    /// Hand out the balanced bytes `buf[start..cursor]` as a frame
    fn take_frame(&mut self) -> Result<Frame, FrameError> {
        let frame = Frame::parse(&self.buf[self.start..self.cursor]);
        self.start = self.cursor;
        frame
    }

    /// Shift unconsumed bytes to the front of the buffer
    fn compact(&mut self) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.cursor -= self.start;
            self.start = 0;
        }
    }

    fn clear_buffer(&mut self) {
        self.buf.clear();
        self.start = 0;
        self.cursor = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}

/// Lazy sequence of frames produced by one [`FrameDecoder::feed`] call
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.decode_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_state_survives_partial_feed() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.feed(br#"[{"x": 1.0, "#).count(), 0);
        assert_eq!(decoder.depth, 2);
        assert_eq!(decoder.cursor, decoder.buffered_len());

        let frames: Vec<_> = decoder.feed(br#""y": 2.0}]"#).collect();
        assert_eq!(frames.len(), 1);
        assert!(decoder.is_empty());
        assert_eq!(decoder.depth, 0);
    }

    #[test]
    fn test_escape_flag_spans_feeds() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.feed(br#"["a\"#).count(), 0);
        assert!(decoder.escaped);
        assert_eq!(decoder.feed(br#""]"#).count(), 0);
        assert!(decoder.in_string);
        let frames: Vec<_> = decoder.feed(br#""]"#).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().value(), &serde_json::json!(["a\"]"]));
    }

    #[test]
    fn test_reset_ends_a_stray_run() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.feed(b"junk").count(), 1);
        assert!(decoder.skipping);

        decoder.reset();

        assert!(!decoder.skipping);
        assert_eq!(decoder.feed(b"more").count(), 1);
    }

    #[test]
    fn test_consumed_bytes_are_compacted_on_next_feed() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.feed(b"[1][2][3").count(), 2);
        assert_eq!(decoder.start, 6);
        assert_eq!(decoder.buffered_len(), 2);

        assert_eq!(decoder.feed(b"]").count(), 1);
        // Only the three bytes left after compaction were ever held
        assert_eq!(decoder.buf.len(), 3);
        assert_eq!(decoder.start, 3);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_minimum_limit_is_one_byte() {
        assert_eq!(FrameDecoder::new(0).max_frame_bytes(), 1);
    }
}

use bytes::BytesMut;

use crate::error::{EventStreamError, Result};
use crate::frame::{try_decode_frame, Frame};

/// Above this many buffered bytes without a complete frame, the session is
/// aborted rather than left to grow unbounded.
pub const MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// Streaming-friendly decoder over the wire format in [`crate::frame`].
///
/// Poolable: `reset()` clears buffered bytes but keeps the allocation, so one
/// instance can be handed to the next request without reallocating. Each
/// instance is owned exclusively for the duration of one request — there is
/// no internal locking.
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append `chunk` to the internal buffer and drain every complete frame
    /// now available. Bytes belonging to a still-partial frame remain
    /// buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            match try_decode_frame(&mut self.buf) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => return Err(e),
            }
        }

        if self.buf.len() >= MAX_BUFFER_BYTES {
            return Err(EventStreamError::BufferOverflow(MAX_BUFFER_BYTES));
        }

        Ok(frames)
    }

    /// Drop buffered bytes for reuse by the next request. Retains whatever
    /// capacity the buffer grew to, up to the overflow threshold.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_frame;

    #[test]
    fn feed_across_two_chunks_emits_frame_once_complete() {
        let bytes = encode_frame(&[(":message-type", "event")], b"{\"content\":\"hi\"}");
        let mut decoder = FrameDecoder::new();

        let (first, second) = bytes.split_at(bytes.len() / 2);
        assert!(decoder.feed(first).unwrap().is_empty());
        let frames = decoder.feed(second).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn feed_emits_multiple_frames_from_one_chunk() {
        let one = encode_frame(&[(":message-type", "event")], b"{\"content\":\"a\"}");
        let two = encode_frame(&[(":message-type", "event")], b"{\"content\":\"b\"}");
        let mut combined = one.clone();
        combined.extend_from_slice(&two);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&combined).unwrap();
        assert_eq!(frames.len(), 2);
    }

    /// A prefix with a valid prelude CRC but a `totalLength` far larger than
    /// what follows — the frame stays perpetually partial, so buffer growth
    /// alone must trip the overflow guard.
    fn perpetually_partial_prefix(len: usize) -> Vec<u8> {
        let mut chunk = vec![0u8; len];
        chunk[0..4].copy_from_slice(&(u32::MAX).to_be_bytes());
        let prelude_crc = crc32fast::hash(&chunk[0..8]);
        chunk[8..12].copy_from_slice(&prelude_crc.to_be_bytes());
        chunk
    }

    #[test]
    fn buffer_exactly_at_threshold_without_complete_frame_overflows() {
        let mut decoder = FrameDecoder::new();
        let chunk = perpetually_partial_prefix(MAX_BUFFER_BYTES);
        let err = decoder.feed(&chunk).unwrap_err();
        assert!(matches!(err, EventStreamError::BufferOverflow(_)));
    }

    #[test]
    fn buffer_just_under_threshold_without_complete_frame_does_not_overflow() {
        let mut decoder = FrameDecoder::new();
        let chunk = perpetually_partial_prefix(MAX_BUFFER_BYTES - 1);
        let result = decoder.feed(&chunk);
        assert!(result.is_ok());
    }

    #[test]
    fn reset_clears_buffered_partial_frame() {
        let bytes = encode_frame(&[(":message-type", "event")], b"{}");
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes[..bytes.len() - 1]).unwrap();
        assert!(decoder.buffered_len() > 0);
        decoder.reset();
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn crc_error_aborts_and_caller_discards_decoder() {
        let mut bytes = encode_frame(&[(":message-type", "event")], b"{}");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&bytes).is_err());
    }
}

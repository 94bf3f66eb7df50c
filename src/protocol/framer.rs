//! # Line Framer
//!
//! Splits the inbound byte stream into newline-delimited frames. Bytes after
//! the last separator are carried over to the next chunk, so a frame may be
//! split across any number of reads and several frames may share one read.

use bytes::{Buf, BytesMut};
use tracing::warn;

use super::constants::{FRAME_SEPARATORS, MAX_PENDING_FRAME_BYTES};

/// Carry-over buffer plus the splitting logic
#[derive(Debug)]
pub struct LineFramer {
    carry: BytesMut,
    max_pending: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the default pending-frame limit
    pub fn new() -> Self {
        Self::with_max_pending(MAX_PENDING_FRAME_BYTES)
    }

    /// Create a framer that drops a partial frame once it grows past
    /// `max_pending` bytes without a separator
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            carry: BytesMut::with_capacity(max_pending.min(MAX_PENDING_FRAME_BYTES)),
            max_pending,
        }
    }

    /// Feed one chunk and collect every frame it completes
    ///
    /// Frames are split on `\n` or `\r`, trimmed, and empty ones are skipped,
    /// so `\r\n` line endings never produce blank frames.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self
            .carry
            .iter()
            .position(|byte| FRAME_SEPARATORS.contains(byte))
        {
            let line = self.carry.split_to(pos);
            self.carry.advance(1);

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                frames.push(text.to_string());
            }
        }

        if self.carry.len() > self.max_pending {
            warn!(
                "Discarding {} bytes of unterminated input (limit {})",
                self.carry.len(),
                self.max_pending
            );
            self.carry.clear();
        }

        frames
    }

    /// Number of bytes waiting for a separator
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

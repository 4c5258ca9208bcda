//! # Audio Accumulator
//!
//! Collects the decoded bytes of consecutive `audio` chunks until the
//! counterpart signals `audio_end`. The bytes are opaque here: the whole
//! buffer is only interpreted as a WAV container once it is drained.
//!
//! ## Key Features:
//! - **Append-only**: chunks are concatenated in arrival order
//! - **Unbounded**: growth is limited only by how often `audio_end` drains it
//! - **Drain resets**: `drain_and_reset` hands out the buffer and leaves it empty

use sha1::{Digest, Sha1};

/// Byte buffer for one in-flight audio unit.
///
/// ## Ownership:
/// Owned by a single protocol dispatcher. The dispatcher processes one frame
/// at a time, so no lock is needed around the buffer.
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    data: Vec<u8>,
}

impl AudioAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decoded chunk to the end of the buffer.
    ///
    /// ## Parameters:
    /// - **bytes**: raw bytes from a base64-decoded `audio` frame (may be empty)
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Take the full accumulated buffer, leaving the accumulator empty.
    ///
    /// ## Rust Concepts:
    /// - **std::mem::take**: moves the Vec out and puts `Vec::new()` in its place,
    ///   so the bytes are handed over without copying
    pub fn drain_and_reset(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// SHA-1 digest of the current contents as lowercase hex.
    ///
    /// Matches the `checksum` field the counterpart may attach to `audio_end`.
    pub fn checksum(&self) -> String {
        hex::encode(Sha1::digest(&self.data))
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Discard everything buffered so far.
    ///
    /// ## Usage:
    /// Called when the connection shuts down mid-unit.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` as a persistent accumulator: bytes stay buffered
//! until they belong to a fully parsed frame, so a frame split across TCP
//! reads is reassembled instead of dropped.
//!
//! # Example
//!
//! ```
//! use clips_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // First read ends in the middle of a frame.
//! assert_eq!(buffer.push(&[7, 0, b'h', b'e']).count(), 0);
//!
//! // Second read completes it.
//! let frames: Vec<_> = buffer.push(b"llo").collect::<Result<_, _>>().unwrap();
//! assert_eq!(frames[0].text(), Some("hello"));
//! assert!(buffer.is_empty());
//! ```

use bytes::{Buf, BytesMut};

use super::frame::{decode_frame, Decoded, InboundFrame};
use crate::error::Result;

/// Default buffer capacity (64KB), one maximum-size frame.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create a new frame buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a new frame buffer with custom initial capacity.
    ///
    /// The buffer grows past `capacity` when a frame needs more room.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes the buffer can hold before reallocating.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Append data and iterate over every frame it completes.
    ///
    /// The iterator stops at the first malformed frame after yielding its
    /// error; the buffered bytes are dropped at that point since there is no
    /// way to find the next frame boundary.
    pub fn push(&mut self, data: &[u8]) -> Frames<'_> {
        self.extend(data);
        Frames {
            buffer: self,
            done: false,
        }
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a malformed frame; the buffer is cleared
    pub fn next_frame(&mut self) -> Result<Option<InboundFrame>> {
        match decode_frame(&self.buffer, 0) {
            Ok(Decoded::Frame { frame, consumed }) => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            Ok(Decoded::NeedMoreData) => Ok(None),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the frames completed by a [`FrameBuffer::push`].
pub struct Frames<'a> {
    buffer: &'a mut FrameBuffer,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<InboundFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.buffer.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for Frames<'_> {}

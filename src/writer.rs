//! Outbound side of a connection.
//!
//! A [`FrameWriter`] owns the socket's write half together with the command
//! sequence counter, both behind one async mutex:
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► lock ─► encode(seq) ─► write_all + flush ─► seq += 1 ─► unlock
//! Caller N ─┘
//! ```
//!
//! Holding the lock across encode, write and increment means frames are never
//! interleaved on the wire and sequence numbers are neither reused nor skipped.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{ClipsError, Result};
use crate::protocol::encode_command;

/// First sequence number used on a fresh connection.
pub const FIRST_SEQUENCE: u32 = 1;

struct WriterState<W> {
    /// `None` once the connection is closed or a write has failed.
    writer: Option<W>,
    /// `None` once every u32 sequence number has been used.
    next_sequence: Option<u32>,
}

/// Serialized frame writer with a monotonically increasing sequence counter.
pub struct FrameWriter<W> {
    state: Mutex<WriterState<W>>,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a write half; the first frame is sent with sequence 1.
    pub fn new(writer: W) -> Self {
        Self::starting_at(writer, FIRST_SEQUENCE)
    }

    pub(crate) fn starting_at(writer: W, next_sequence: u32) -> Self {
        Self {
            state: Mutex::new(WriterState {
                writer: Some(writer),
                next_sequence: Some(next_sequence),
            }),
        }
    }

    /// Encode `text` as a raw command and write it as one unit.
    ///
    /// Returns the sequence number the frame was sent with. The counter only
    /// advances after the write and flush both succeed.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the writer was shut down or retired
    /// - `SequenceExhausted` after sequence `u32::MAX` has been used
    /// - `FrameTooLarge` if the text does not fit one frame
    /// - `Send` if the socket write fails; the writer is retired
    pub async fn send(&self, text: &str) -> Result<u32> {
        let mut state = self.state.lock().await;

        if state.writer.is_none() {
            return Err(ClipsError::ConnectionClosed);
        }
        let sequence = state.next_sequence.ok_or(ClipsError::SequenceExhausted)?;
        let frame = encode_command(sequence, text)?;

        let Some(writer) = state.writer.as_mut() else {
            return Err(ClipsError::ConnectionClosed);
        };
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            tracing::warn!("Write of command {} failed: {}", sequence, e);
            state.writer = None;
            return Err(ClipsError::Send(e));
        }

        tracing::trace!("Sent command {} ({} bytes)", sequence, frame.len());
        state.next_sequence = sequence.checked_add(1);
        Ok(sequence)
    }

    /// Sequence number the next successful send will use.
    pub async fn next_sequence(&self) -> Option<u32> {
        self.state.lock().await.next_sequence
    }

    /// Whether the write half is still usable.
    pub async fn is_writable(&self) -> bool {
        self.state.lock().await.writer.is_some()
    }

    /// Shut down the write direction and release the write half.
    ///
    /// Waits for an in-flight send to finish first. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut writer) = state.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Write shutdown failed: {}", e);
            }
        }
    }
}

//! Frame encoding and decoding.
//!
//! Pure functions, no I/O: [`encode_command`] turns a command text into one
//! outbound frame, [`decode_frame`] splits one inbound frame off a byte slice.
//!
//! # Example
//!
//! ```
//! use clips_client::protocol::{decode_frame, encode_command, Decoded, InboundFrame};
//!
//! let bytes = encode_command(1, "(reset)").unwrap();
//! assert_eq!(bytes.len(), 7 + "raw (reset)".len());
//!
//! // The server answers with a text frame: length, then the message itself.
//! let inbound = [7, 0, b'h', b'e', b'l', b'l', b'o'];
//! match decode_frame(&inbound, 0).unwrap() {
//!     Decoded::Frame { frame, consumed } => {
//!         assert_eq!(frame, InboundFrame::Text("hello".to_string()));
//!         assert_eq!(consumed, 7);
//!     }
//!     Decoded::NeedMoreData => unreachable!(),
//! }
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{
    read_length, CommandHeader, COMMAND_HEADER_SIZE, LENGTH_FIELD_SIZE, MARKER_CONTROL,
    MAX_FRAME_SIZE, RAW_PREFIX,
};
use crate::error::{ClipsError, Result};

/// A complete inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Marker byte 0: reply or status report, not meant for display.
    ///
    /// Holds the content span, marker byte included. May be empty when the
    /// server sends a bare length field.
    Control(Bytes),
    /// Non-zero marker: human readable text. The marker byte is the first
    /// character of the message.
    Text(String),
}

impl InboundFrame {
    /// The marker byte, or `None` for an empty control frame.
    pub fn marker(&self) -> Option<u8> {
        match self {
            InboundFrame::Control(content) => content.first().copied(),
            InboundFrame::Text(text) => text.as_bytes().first().copied(),
        }
    }

    /// Text content, if this is a text frame.
    pub fn text(&self) -> Option<&str> {
        match self {
            InboundFrame::Text(text) => Some(text),
            InboundFrame::Control(_) => None,
        }
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(self, InboundFrame::Control(_))
    }
}

/// Outcome of a single decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame was available. `consumed` always equals its declared length.
    Frame { frame: InboundFrame, consumed: usize },
    /// The buffer ends inside a frame; nothing was consumed.
    NeedMoreData,
}

/// Encode a raw command into a single outbound frame.
///
/// The payload is `"raw " + text`; the length field counts the whole frame.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the frame would exceed [`MAX_FRAME_SIZE`].
pub fn encode_command(sequence: u32, text: &str) -> Result<Bytes> {
    let payload_len = RAW_PREFIX.len() + text.len();
    let header = CommandHeader::for_payload(sequence, payload_len).ok_or(
        ClipsError::FrameTooLarge {
            size: COMMAND_HEADER_SIZE.saturating_add(payload_len),
            max: MAX_FRAME_SIZE,
        },
    )?;

    let mut buf = BytesMut::with_capacity(header.length as usize);
    buf.put_slice(&header.encode());
    buf.put_slice(RAW_PREFIX.as_bytes());
    buf.put_slice(text.as_bytes());
    debug_assert_eq!(buf.len(), header.length as usize);
    Ok(buf.freeze())
}

/// Decode one inbound frame starting at `offset`.
///
/// # Errors
///
/// Returns `MalformedFrame` if the declared length is smaller than the length
/// field itself, or if a text frame is not valid UTF-8.
pub fn decode_frame(buf: &[u8], offset: usize) -> Result<Decoded> {
    let buf = buf.get(offset..).unwrap_or_default();

    let Some(length) = read_length(buf) else {
        return Ok(Decoded::NeedMoreData);
    };
    let length = length as usize;

    if length < LENGTH_FIELD_SIZE {
        return Err(ClipsError::MalformedFrame(format!(
            "declared length {} is shorter than the {}-byte length field",
            length, LENGTH_FIELD_SIZE
        )));
    }

    if buf.len() < length {
        return Ok(Decoded::NeedMoreData);
    }

    let content = &buf[LENGTH_FIELD_SIZE..length];
    let frame = match content.first() {
        None | Some(&MARKER_CONTROL) => InboundFrame::Control(Bytes::copy_from_slice(content)),
        Some(_) => {
            let text = std::str::from_utf8(content).map_err(|e| {
                ClipsError::MalformedFrame(format!("text frame is not valid UTF-8: {}", e))
            })?;
            InboundFrame::Text(text.to_owned())
        }
    };

    Ok(Decoded::Frame {
        frame,
        consumed: length,
    })
}

/// Build an inbound frame the way the server does. Test helper.
#[cfg(test)]
pub(crate) fn inbound_bytes(content: &[u8]) -> Vec<u8> {
    let length = (LENGTH_FIELD_SIZE + content.len()) as u16;
    let mut bytes = length.to_le_bytes().to_vec();
    bytes.extend_from_slice(content);
    bytes
}

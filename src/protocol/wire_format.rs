//! Wire format constants and the outbound command header.
//!
//! Outbound (client → server) command frame:
//! ```text
//! ┌──────────┬───────┬──────────┬─────────────────────┐
//! │ Length   │ Pad   │ Sequence │ Payload             │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ "raw " + text, UTF-8│
//! │ uint16 LE│ 0x00  │ uint32 LE│                     │
//! └──────────┴───────┴──────────┴─────────────────────┘
//! ```
//!
//! Inbound (server → client) frame:
//! ```text
//! ┌──────────┬────────┬──────────────┐
//! │ Length   │ Marker │ Rest         │
//! │ 2 bytes  │ 1 byte │ Length-3     │
//! │ uint16 LE│        │              │
//! └──────────┴────────┴──────────────┘
//! ```
//!
//! `Length` always counts the whole frame, including the length field itself.
//! All multi-byte integers are Little Endian in both directions.

/// Size of the length field that starts every frame.
pub const LENGTH_FIELD_SIZE: usize = 2;

/// Outbound header size in bytes (length + pad + sequence).
pub const COMMAND_HEADER_SIZE: usize = 7;

/// Largest frame the 2-byte length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Prefix the server expects before the text of a raw command.
pub const RAW_PREFIX: &str = "raw ";

/// Inbound marker byte for control frames (replies and status reports).
pub const MARKER_CONTROL: u8 = 0;

/// Decoded outbound command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Total frame size, header included.
    pub length: u16,
    /// Per-connection command sequence number.
    pub sequence: u32,
}

impl CommandHeader {
    /// Create a header for a payload of `payload_len` bytes.
    ///
    /// Returns `None` if the frame would not fit the length field.
    pub fn for_payload(sequence: u32, payload_len: usize) -> Option<Self> {
        let total = COMMAND_HEADER_SIZE.checked_add(payload_len)?;
        let length = u16::try_from(total).ok()?;
        Some(Self { length, sequence })
    }

    /// Payload length implied by the length field.
    #[inline]
    pub fn payload_len(&self) -> usize {
        (self.length as usize).saturating_sub(COMMAND_HEADER_SIZE)
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use clips_client::protocol::CommandHeader;
    ///
    /// let header = CommandHeader::for_payload(1, 9).unwrap();
    /// assert_eq!(header.encode(), [16, 0, 0, 1, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; COMMAND_HEADER_SIZE] {
        let mut buf = [0u8; COMMAND_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.length.to_le_bytes());
        buf[2] = 0;
        buf[3..7].copy_from_slice(&self.sequence.to_le_bytes());
        buf
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < COMMAND_HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u16::from_le_bytes([buf[0], buf[1]]),
            sequence: u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]),
        })
    }
}

/// Read the length field at the start of `buf`, if present.
#[inline]
pub fn read_length(buf: &[u8]) -> Option<u16> {
    match buf {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

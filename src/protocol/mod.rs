//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary protocol spoken with the rule-engine
//! server:
//! - 7-byte command header encoding
//! - Inbound frame decoding (control vs. text frames)
//! - Frame buffer for accumulating partial reads
//! - Reply parsing for control frames

mod frame;
mod frame_buffer;
mod reply;
mod wire_format;

pub use frame::{decode_frame, encode_command, Decoded, InboundFrame};
pub use frame_buffer::{FrameBuffer, Frames, DEFAULT_BUFFER_CAPACITY};
pub use reply::{Reply, STATUS_COMMAND_ID};
pub use wire_format::{
    read_length, CommandHeader, COMMAND_HEADER_SIZE, LENGTH_FIELD_SIZE, MARKER_CONTROL,
    MAX_FRAME_SIZE, RAW_PREFIX,
};

//! Error types for clips-client.

use thiserror::Error;

/// Main error type for all connection and framing operations.
#[derive(Debug, Error)]
pub enum ClipsError {
    /// Could not establish the TCP connection. Never retried by this crate.
    #[error("Could not connect to {target}: {source}")]
    Connect {
        /// `address:port` that was dialed.
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing an outbound frame to the socket failed.
    #[error("Send failed: {0}")]
    Send(#[source] std::io::Error),

    /// The connection was closed locally or its write side was retired.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Encoded frame does not fit the 2-byte length field.
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Every 32-bit command sequence number has been used.
    #[error("Command sequence numbers exhausted")]
    SequenceExhausted,

    /// Inbound bytes do not form a valid frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClipsError {
    /// Whether this error is one a `send` call reports.
    pub fn is_send_error(&self) -> bool {
        matches!(
            self,
            ClipsError::Send(_)
                | ClipsError::ConnectionClosed
                | ClipsError::FrameTooLarge { .. }
                | ClipsError::SequenceExhausted
        )
    }
}

/// Result type alias using ClipsError.
pub type Result<T> = std::result::Result<T, ClipsError>;

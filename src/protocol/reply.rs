//! Server replies carried in control frames.
//!
//! ```text
//! ┌────────┬────────────┬─────────┬──────────────┐
//! │ Marker │ Command ID │ Success │ Result       │
//! │ 0x00   │ uint32 LE  │ 1 byte  │ UTF-8, opt.  │
//! └────────┴────────────┴─────────┴──────────────┘
//! ```
//!
//! A command ID of [`STATUS_COMMAND_ID`] marks an unsolicited status report
//! such as `watching:3|path:/srv/clp`.

use super::wire_format::MARKER_CONTROL;

/// Command ID the server uses for status reports.
pub const STATUS_COMMAND_ID: u32 = u32::MAX;

const REPLY_MIN_SIZE: usize = 6;

/// A decoded reply to a command, or a status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub command_id: u32,
    pub success: bool,
    pub result: String,
}

impl Reply {
    /// Parse the content span of a control frame.
    ///
    /// Returns `None` if the content is too short or not a control frame.
    /// Invalid UTF-8 in the result is replaced rather than rejected.
    pub fn parse(content: &[u8]) -> Option<Self> {
        if content.len() < REPLY_MIN_SIZE || content[0] != MARKER_CONTROL {
            return None;
        }
        Some(Self {
            command_id: u32::from_le_bytes([content[1], content[2], content[3], content[4]]),
            success: content[5] != 0,
            result: String::from_utf8_lossy(&content[REPLY_MIN_SIZE..]).into_owned(),
        })
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        self.command_id == STATUS_COMMAND_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_reply() {
        let mut content = vec![0, 7, 0, 0, 0, 1];
        content.extend_from_slice(b"TRUE");

        let reply = Reply::parse(&content).unwrap();
        assert_eq!(reply.command_id, 7);
        assert!(reply.success);
        assert_eq!(reply.result, "TRUE");
        assert!(!reply.is_status());
    }

    #[test]
    fn test_parse_status_report() {
        let mut content = vec![0, 0xFF, 0xFF, 0xFF, 0xFF, 1];
        content.extend_from_slice(b"watching:3|path:/srv/clp");

        let reply = Reply::parse(&content).unwrap();
        assert!(reply.is_status());
        assert_eq!(reply.result, "watching:3|path:/srv/clp");
    }

    #[test]
    fn test_parse_rejects_short_or_text() {
        assert!(Reply::parse(&[]).is_none());
        assert!(Reply::parse(&[0, 1, 0, 0, 0]).is_none());
        assert!(Reply::parse(b"hello world").is_none());
    }

    #[test]
    fn test_parse_failed_reply_without_result() {
        let reply = Reply::parse(&[0, 2, 0, 0, 0, 0]).unwrap();
        assert!(!reply.success);
        assert!(reply.result.is_empty());
    }
}

use tracing::warn;

use crate::{ArmError, Command};

/// Frame delimiter on the wire. There is no length prefix; the delimiter is
/// the only frame boundary.
pub const FRAME_DELIMITER: &str = "\r\n";

/// Serializes a command into one delimiter-terminated frame.
pub fn encode_frame(command: &Command) -> Result<String, ArmError> {
    Ok(serde_json::to_string(command)? + FRAME_DELIMITER)
}

/// Reassembles delimited frames from a raw byte stream. The internal buffer
/// persists across reads, so a single read may yield zero, one or many
/// frames, and a frame split across reads is completed once its tail
/// arrives. Empty and whitespace-only fragments are discarded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes to the reassembly buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete frame, stripped of its delimiter, or `None` if only an
    /// undelimited tail remains. Non-UTF-8 fragments are dropped with a
    /// warning rather than poisoning the stream.
    pub fn next_frame(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut chunk: Vec<u8> = self.buffer.drain(..=pos).collect();
            chunk.pop();
            if chunk.last() == Some(&b'\r') {
                chunk.pop();
            }
            match String::from_utf8(chunk) {
                Ok(line) if !line.trim().is_empty() => return Some(line),
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "dropping non-UTF-8 frame fragment");
                    continue;
                }
            }
        }
        None
    }
}

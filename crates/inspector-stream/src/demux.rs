//! Line demultiplexing for the agent's two output pipes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipe a chunk or line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Process stdout, where the agent writes its JSON events
    #[serde(rename = "stdout")]
    Primary,
    /// Process stderr
    #[serde(rename = "stderr")]
    Diagnostic,
}

impl Channel {
    /// Tag used as the `subtype` of synthetic log events
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Primary => "stdout",
            Channel::Diagnostic => "stderr",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits per-channel byte chunks into complete lines.
///
/// Each channel owns a residual buffer holding the bytes after its last
/// newline. Buffering happens at the byte level so a UTF-8 sequence cut by a
/// chunk boundary is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineDemux {
    primary: Vec<u8>,
    diagnostic: Vec<u8>,
}

impl LineDemux {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer_mut(&mut self, channel: Channel) -> &mut Vec<u8> {
        match channel {
            Channel::Primary => &mut self.primary,
            Channel::Diagnostic => &mut self.diagnostic,
        }
    }

    /// Append a chunk and return every line it completed, without terminators
    pub fn push(&mut self, channel: Channel, chunk: &[u8]) -> Vec<String> {
        let buffer = self.buffer_mut(channel);
        // The residual holds no newline, so only the new bytes need scanning.
        let mut scan_from = buffer.len();
        buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = buffer[scan_from..].iter().position(|&b| b == b'\n') {
            let end = scan_from + offset;
            lines.push(String::from_utf8_lossy(&buffer[line_start..end]).into_owned());
            line_start = end + 1;
            scan_from = line_start;
        }
        buffer.drain(..line_start);
        lines
    }

    /// Bytes held for a channel awaiting a terminator
    pub fn pending(&self, channel: Channel) -> usize {
        match channel {
            Channel::Primary => self.primary.len(),
            Channel::Diagnostic => self.diagnostic.len(),
        }
    }

    /// Emit each non-empty residual as a final line, primary first
    pub fn flush(&mut self) -> Vec<(Channel, String)> {
        [Channel::Primary, Channel::Diagnostic]
            .into_iter()
            .filter_map(|channel| {
                let residual = std::mem::take(self.buffer_mut(channel));
                if residual.is_empty() {
                    None
                } else {
                    Some((channel, String::from_utf8_lossy(&residual).into_owned()))
                }
            })
            .collect()
    }
}

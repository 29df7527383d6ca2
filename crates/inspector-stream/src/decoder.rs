//! Line-to-event decoding

use serde_json::Value;

use crate::demux::{Channel, LineDemux};
use crate::types::AgentEvent;

/// Decode one complete output line.
///
/// Returns `None` only for blank lines. A line that is not a JSON object with
/// a string `type` becomes a `log` event tagged with the channel it arrived on.
pub fn decode_line(line: &str, channel: Channel) -> Option<AgentEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => match AgentEvent::from_value(value) {
            Ok(event) => return Some(event),
            Err(e) => {
                tracing::debug!(%channel, error = %e, "JSON line is not an agent event");
            }
        },
        Err(e) => {
            tracing::debug!(%channel, error = %e, "failed to parse line as JSON");
        }
    }

    Some(AgentEvent::log(trimmed, channel))
}

/// Push-driven decoder: raw chunks in, events out.
///
/// Call [`EventDecoder::push`] for every chunk in arrival order and
/// [`EventDecoder::finish`] once both pipes are closed.
#[derive(Debug, Default)]
pub struct EventDecoder {
    demux: LineDemux,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: Channel, chunk: &[u8]) -> Vec<AgentEvent> {
        self.demux
            .push(channel, chunk)
            .iter()
            .filter_map(|line| decode_line(line, channel))
            .collect()
    }

    /// Decode whatever unterminated output remains
    pub fn finish(&mut self) -> Vec<AgentEvent> {
        self.demux
            .flush()
            .iter()
            .filter_map(|(channel, line)| decode_line(line, *channel))
            .collect()
    }
}

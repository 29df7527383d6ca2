//! Replay recorded output through the reconciler

use inspector_stream::{AgentEvent, Channel, StreamFrame, decode_line};
use serde_json::Value;
use std::io::BufRead;

/// `type` values that mark a line as an outbound frame rather than a raw event
const FRAME_TYPES: &[&str] = &["start", "message-metadata", "data-agentEvent", "finish"];

/// Event carried by one recorded line.
///
/// Accepts frames written by `inspector run --format frames` as well as raw
/// agent output; framing-only lines yield nothing and anything undecodable
/// becomes a log event, as it would during a live run.
pub fn replay_line(line: &str) -> Option<AgentEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let is_frame = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| FRAME_TYPES.contains(&kind));
        if is_frame {
            return match serde_json::from_value::<StreamFrame>(value) {
                Ok(frame) => frame.event().cloned(),
                Err(e) => {
                    tracing::debug!(error = %e, "malformed frame in replay input");
                    Some(AgentEvent::log(trimmed, Channel::Primary))
                }
            };
        }
    }

    decode_line(trimmed, Channel::Primary)
}

/// Decode every line of a recording, in order
pub fn read_events(reader: impl BufRead) -> std::io::Result<Vec<AgentEvent>> {
    let mut events = Vec::new();
    for line in reader.lines() {
        if let Some(event) = replay_line(&line?) {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector_agent::{DisplayItem, build_items};

    #[test]
    fn test_frames_and_raw_events_mix() {
        let recording = r#"{"type":"start","messageMetadata":{"createdAt":1}}
{"type":"data-agentEvent","id":"event-0","data":{"type":"assistant","model_call_id":"m1","message":{"content":[{"type":"text","text":"Hi"}]}}}

{"type":"tool_call","subtype":"started","call_id":"c1","tool_call":{"lsToolCall":{}}}
not json at all
{"type":"finish","messageMetadata":{"createdAt":1,"exitCode":0}}
"#;
        let events = read_events(recording.as_bytes()).unwrap();
        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["assistant", "tool_call", "log"]);

        let items = build_items(&events);
        assert!(matches!(&items[0], DisplayItem::Assistant(a) if a.text == "Hi" && a.is_final));
        assert!(matches!(&items[2], DisplayItem::Log(l) if l.source == "stdout"));
    }

    #[test]
    fn test_malformed_frame_is_kept_as_log() {
        let event = replay_line(r#"{"type":"data-agentEvent","id":"event-0"}"#).unwrap();
        assert_eq!(event.kind(), "log");
        assert_eq!(replay_line("   "), None);
    }
}

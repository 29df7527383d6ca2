//! Agent event wire types
//!
//! The agent writes one JSON object per line, tagged by `type`. Each known kind
//! maps to a payload struct with its modelled fields typed; anything the agent
//! adds beyond those lands in the payload's `extra` map, so an event can be
//! forwarded without losing fields. A modelled field of an unexpected shape is
//! read as absent and its raw value kept in `extra`, so a known `type` always
//! decodes to its own variant.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::demux::Channel;
use crate::error::{Error, Result};

/// Run id used when an event names no session
pub const DEFAULT_RUN_ID: &str = "default";

/// Deserialize an optional field, reading a value of the wrong shape as absent
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Deserialize a list, skipping elements of the wrong shape
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => values
            .into_iter()
            .filter_map(|value| T::deserialize(value).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Identity fields shared by every event kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventIds {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "runId", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model_call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

/// Phase of a thinking event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingPhase {
    Delta,
    Completed,
}

/// Phase of a tool call event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallPhase {
    Started,
    Completed,
}

/// Reasoning trace chunk or final reasoning text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThinkingEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThinkingEvent {
    pub fn phase(&self) -> Option<ThinkingPhase> {
        match self.subtype.as_deref() {
            Some("delta") => Some(ThinkingPhase::Delta),
            Some("completed") => Some(ThinkingPhase::Completed),
            _ => None,
        }
    }
}

/// One content part of an assistant message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentPart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: Some("text".to_string()),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}

/// Message body of an assistant event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub content: Vec<ContentPart>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Assistant-authored text segment (delta or cumulative snapshot)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub message: Option<AssistantMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssistantEvent {
    /// Concatenation of the message's `text` parts, in order
    pub fn text(&self) -> String {
        self.message
            .iter()
            .flat_map(|message| message.content.iter())
            .filter(|part| part.kind.as_deref() == Some("text"))
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

/// End-of-run marker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tool invocation lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCallEvent {
    pub fn phase(&self) -> Option<ToolCallPhase> {
        match self.subtype.as_deref() {
            Some("started") => Some(ToolCallPhase::Started),
            Some("completed") => Some(ToolCallPhase::Completed),
            _ => None,
        }
    }
}

/// Agent system notice (init banner, warnings)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SystemEvent {
    /// Flatten `message` into display text.
    ///
    /// Accepts a plain string, an object with a `content` list (element `text`
    /// fields joined with spaces, then trimmed), or an object with a string
    /// `text`. Returns `None` for any other shape.
    pub fn notice(&self) -> Option<String> {
        match self.message.as_ref()? {
            Value::String(message) => Some(message.clone()),
            Value::Object(object) => {
                if let Some(Value::Array(content)) = object.get("content") {
                    let joined = content
                        .iter()
                        .map(|entry| entry.get("text").and_then(Value::as_str).unwrap_or(""))
                        .collect::<Vec<_>>()
                        .join(" ");
                    return Some(joined.trim().to_string());
                }
                object
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }
            _ => None,
        }
    }
}

/// Error reported by the agent itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorEvent {
    /// The error text: a non-empty string, or an object's string `message`
    pub fn message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::String(message) if !message.is_empty() => Some(message.clone()),
            Value::Object(object) => object
                .get("message")
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Raw output line, either emitted by the agent or synthesized from non-JSON output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(flatten)]
    pub ids: EventIds,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A decoded agent event, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Thinking(ThinkingEvent),
    Assistant(AssistantEvent),
    Result(ResultEvent),
    ToolCall(ToolCallEvent),
    System(SystemEvent),
    Error(ErrorEvent),
    Log(LogEvent),
    /// An event kind this crate does not model; kept verbatim
    Unknown {
        kind: String,
        fields: Map<String, Value>,
    },
}

/// A payload struct with an overflow map for fields it does not hold
trait Payload: DeserializeOwned + Serialize {
    fn extra_mut(&mut self) -> &mut Map<String, Value>;
}

macro_rules! impl_payload {
    ($($payload:ty),*) => {
        $(impl Payload for $payload {
            fn extra_mut(&mut self) -> &mut Map<String, Value> {
                &mut self.extra
            }
        })*
    };
}

impl_payload!(ThinkingEvent, AssistantEvent, ResultEvent, ToolCallEvent, SystemEvent, ErrorEvent, LogEvent);

/// Decode a payload; top-level fields dropped as mis-shaped move to `extra`
fn typed<T: Payload>(fields: Map<String, Value>) -> Result<T> {
    let mut payload: T = serde_json::from_value(Value::Object(fields.clone()))?;
    let kept = match serde_json::to_value(&payload)? {
        Value::Object(kept) => kept,
        _ => Map::new(),
    };
    for (key, value) in fields {
        if !kept.contains_key(&key) {
            payload.extra_mut().insert(key, value);
        }
    }
    Ok(payload)
}

impl AgentEvent {
    /// Build an event from a parsed JSON value.
    ///
    /// The value must be an object with a string `type`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::NotAnEvent("expected a JSON object".to_string()));
        };
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(Error::NotAnEvent(format!("non-string type: {}", other)));
            }
            None => return Err(Error::NotAnEvent("missing type".to_string())),
        };

        let event = match kind.as_str() {
            "thinking" => Self::Thinking(typed(fields)?),
            "assistant" => Self::Assistant(typed(fields)?),
            "result" => Self::Result(typed(fields)?),
            "tool_call" => Self::ToolCall(typed(fields)?),
            "system" => Self::System(typed(fields)?),
            "error" => Self::Error(typed(fields)?),
            "log" => Self::Log(typed(fields)?),
            _ => Self::Unknown {
                kind: kind.clone(),
                fields,
            },
        };
        Ok(event)
    }

    /// Serialize back to the wire object, `type` included
    pub fn to_value(&self) -> Result<Value> {
        let (kind, body) = match self {
            Self::Thinking(e) => ("thinking", serde_json::to_value(e)?),
            Self::Assistant(e) => ("assistant", serde_json::to_value(e)?),
            Self::Result(e) => ("result", serde_json::to_value(e)?),
            Self::ToolCall(e) => ("tool_call", serde_json::to_value(e)?),
            Self::System(e) => ("system", serde_json::to_value(e)?),
            Self::Error(e) => ("error", serde_json::to_value(e)?),
            Self::Log(e) => ("log", serde_json::to_value(e)?),
            Self::Unknown { kind, fields } => (kind.as_str(), Value::Object(fields.clone())),
        };
        let mut object = match body {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        object.insert("type".to_string(), Value::String(kind.to_string()));
        Ok(Value::Object(object))
    }

    /// Synthetic log event for a line that did not decode as an event
    pub fn log(text: impl Into<String>, channel: Channel) -> Self {
        Self::Log(LogEvent {
            subtype: Some(channel.as_str().to_string()),
            text: Some(text.into()),
            ..Default::default()
        })
    }

    /// Synthetic system notice
    pub fn system(message: impl Into<String>) -> Self {
        Self::System(SystemEvent {
            message: Some(Value::String(message.into())),
            ..Default::default()
        })
    }

    /// The wire `type` of this event
    pub fn kind(&self) -> &str {
        match self {
            Self::Thinking(_) => "thinking",
            Self::Assistant(_) => "assistant",
            Self::Result(_) => "result",
            Self::ToolCall(_) => "tool_call",
            Self::System(_) => "system",
            Self::Error(_) => "error",
            Self::Log(_) => "log",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Identity fields, when the kind is modelled
    pub fn ids(&self) -> Option<&EventIds> {
        match self {
            Self::Thinking(e) => Some(&e.ids),
            Self::Assistant(e) => Some(&e.ids),
            Self::Result(e) => Some(&e.ids),
            Self::ToolCall(e) => Some(&e.ids),
            Self::System(e) => Some(&e.ids),
            Self::Error(e) => Some(&e.ids),
            Self::Log(e) => Some(&e.ids),
            Self::Unknown { .. } => None,
        }
    }

    /// Run identity: first non-empty of `session_id`, `runId`, else [`DEFAULT_RUN_ID`]
    pub fn run_id(&self) -> &str {
        self.explicit_run_id().unwrap_or(DEFAULT_RUN_ID)
    }

    /// Run identity only when the event names one
    pub fn explicit_run_id(&self) -> Option<&str> {
        let candidates = match self {
            Self::Unknown { fields, .. } => [
                fields.get("session_id").and_then(Value::as_str),
                fields.get("runId").and_then(Value::as_str),
            ],
            _ => {
                let ids = self.ids();
                [
                    ids.and_then(|ids| ids.session_id.as_deref()),
                    ids.and_then(|ids| ids.run_id.as_deref()),
                ]
            }
        };
        candidates
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
    }

    /// Model invocation that produced this event, if named
    pub fn model_call_id(&self) -> Option<&str> {
        let from_ids = self.ids().and_then(|ids| ids.model_call_id.as_deref());
        let from_message = match self {
            Self::Assistant(e) => e
                .message
                .as_ref()
                .and_then(|message| message.model_call_id.as_deref()),
            _ => None,
        };
        from_ids
            .or(from_message)
            .filter(|id| !id.is_empty())
    }

    pub fn call_id(&self) -> Option<&str> {
        self.ids()
            .and_then(|ids| ids.call_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn timestamp_ms(&self) -> Option<u64> {
        self.ids().and_then(|ids| ids.timestamp_ms)
    }
}

impl Serialize for AgentEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AgentEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> AgentEvent {
        AgentEvent::from_value(value).unwrap()
    }

    #[test]
    fn test_unmodelled_fields_survive_round_trip() {
        let raw = json!({
            "type": "result",
            "subtype": "success",
            "session_id": "s1",
            "duration_ms": 1200,
            "request_id": "req-9",
            "result": "done"
        });
        let decoded = event(raw.clone());
        match &decoded {
            AgentEvent::Result(result) => {
                assert_eq!(result.duration_ms, Some(1200));
                assert_eq!(result.extra.get("request_id"), Some(&json!("req-9")));
            }
            other => panic!("expected result, got {:?}", other),
        }
        assert_eq!(decoded.to_value().unwrap(), raw);
    }

    #[test]
    fn test_mis_shaped_fields_are_kept_raw() {
        let raw = json!({
            "type": "assistant",
            "session_id": 7,
            "timestamp_ms": "123",
            "message": {"content": [{"type": "text", "text": "Hi"}, 3]}
        });
        let decoded = event(raw.clone());
        let AgentEvent::Assistant(assistant) = &decoded else {
            panic!("expected assistant, got {:?}", decoded);
        };
        assert_eq!(assistant.text(), "Hi");
        assert_eq!(assistant.ids.session_id, None);
        assert_eq!(decoded.run_id(), DEFAULT_RUN_ID);
        assert_eq!(assistant.extra.get("timestamp_ms"), Some(&json!("123")));

        let raw = json!({"type": "result", "result": {"ok": true}, "is_error": null});
        assert_eq!(event(raw.clone()).to_value().unwrap(), raw);
    }

    #[test]
    fn test_unknown_kind_is_kept() {
        let raw = json!({"type": "user", "message": {"role": "user"}, "session_id": "s2"});
        let decoded = event(raw.clone());
        assert_eq!(decoded.kind(), "user");
        assert_eq!(decoded.run_id(), "s2");
        assert_eq!(serde_json::to_value(&decoded).unwrap(), raw);
    }

    #[test]
    fn test_missing_or_non_string_type_is_rejected() {
        assert!(AgentEvent::from_value(json!({"text": "hi"})).is_err());
        assert!(AgentEvent::from_value(json!({"type": 3})).is_err());
        assert!(AgentEvent::from_value(json!(["type"])).is_err());
    }

    #[test]
    fn test_run_id_precedence() {
        let both = event(json!({"type": "log", "session_id": "s", "runId": "r"}));
        assert_eq!(both.run_id(), "s");

        let empty_session = event(json!({"type": "log", "session_id": "", "runId": "r"}));
        assert_eq!(empty_session.run_id(), "r");

        let neither = event(json!({"type": "log"}));
        assert_eq!(neither.run_id(), DEFAULT_RUN_ID);
        assert_eq!(neither.explicit_run_id(), None);
    }

    #[test]
    fn test_model_call_id_falls_back_to_message() {
        let nested = event(json!({
            "type": "assistant",
            "message": {"content": [], "model_call_id": "m2"}
        }));
        assert_eq!(nested.model_call_id(), Some("m2"));

        let top = event(json!({
            "type": "assistant",
            "model_call_id": "m1",
            "message": {"content": [], "model_call_id": "m2"}
        }));
        assert_eq!(top.model_call_id(), Some("m1"));

        let blank = event(json!({"type": "assistant", "model_call_id": ""}));
        assert_eq!(blank.model_call_id(), None);
    }

    #[test]
    fn test_assistant_text_keeps_only_text_parts() {
        let decoded = event(json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Hello"},
                    {"type": "image", "data": "..."},
                    {"type": "text", "text": " world"}
                ]
            }
        }));
        let AgentEvent::Assistant(assistant) = decoded else {
            panic!("expected assistant");
        };
        assert_eq!(assistant.text(), "Hello world");
    }

    #[test]
    fn test_system_notice_shapes() {
        let notice = |message: Value| SystemEvent {
            message: Some(message),
            ..Default::default()
        }
        .notice();

        assert_eq!(notice(json!("plain")), Some("plain".to_string()));
        assert_eq!(notice(json!({"text": "object"})), Some("object".to_string()));
        assert_eq!(
            notice(json!({"content": [{"text": " a"}, {"other": 1}, {"text": "b "}]})),
            Some("a  b".to_string())
        );
        assert_eq!(notice(json!(42)), None);
        assert_eq!(SystemEvent::default().notice(), None);
    }

    #[test]
    fn test_error_message_shapes() {
        let message = |error: Value| ErrorEvent {
            error: Some(error),
            ..Default::default()
        }
        .message();

        assert_eq!(message(json!("boom")), Some("boom".to_string()));
        assert_eq!(message(json!({"message": "nested"})), Some("nested".to_string()));
        assert_eq!(message(json!("")), None);
        assert_eq!(message(json!(false)), None);
    }

    #[test]
    fn test_phases() {
        let thinking = ThinkingEvent {
            subtype: Some("completed".into()),
            ..Default::default()
        };
        assert_eq!(thinking.phase(), Some(ThinkingPhase::Completed));

        let tool = ToolCallEvent {
            subtype: Some("progress".into()),
            ..Default::default()
        };
        assert_eq!(tool.phase(), None);
    }

    #[test]
    fn test_synthetic_log_is_tagged_with_channel() {
        let log = AgentEvent::log("oops", Channel::Diagnostic);
        assert_eq!(
            log.to_value().unwrap(),
            json!({"type": "log", "subtype": "stderr", "text": "oops"})
        );
    }
}

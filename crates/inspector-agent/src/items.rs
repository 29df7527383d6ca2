//! Display items derived from the agent event stream

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::{ToolKind, ToolResultView};

/// Severity of a system notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemLevel {
    Info,
    Warning,
    Error,
}

impl SystemLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemLevel::Info => "info",
            SystemLevel::Warning => "warning",
            SystemLevel::Error => "error",
        }
    }
}

/// Substring → level, checked in order against a lowercased message
const NOTICE_LEVELS: &[(&str, SystemLevel)] = &[
    ("error", SystemLevel::Error),
    ("warn", SystemLevel::Warning),
];

/// Classify a system notice by case-insensitive substring match
pub fn classify_notice(message: &str) -> SystemLevel {
    let lower = message.to_lowercase();
    NOTICE_LEVELS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, level)| *level)
        .unwrap_or(SystemLevel::Info)
}

/// Lifecycle state of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Started,
    Completed,
}

/// Reasoning trace of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingItem {
    pub key: String,
    pub run_id: String,
    /// 1-based position among this run's thinking items
    pub sequence: u32,
    pub text: String,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

/// Assistant text attributed to one model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantItem {
    pub key: String,
    pub run_id: String,
    pub segment_id: String,
    pub text: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolItem {
    pub key: String,
    pub call_id: String,
    pub tool_kind: ToolKind,
    pub label: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ToolItem {
    /// Typed view of the payload for renderers
    pub fn result_view(&self) -> ToolResultView {
        ToolResultView::build(self.tool_kind, &self.call_id, self.payload.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemItem {
    pub key: String,
    pub level: SystemLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorItem {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogItem {
    pub key: String,
    pub text: String,
    pub source: String,
}

/// A renderable conversation item, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayItem {
    Thinking(ThinkingItem),
    Assistant(AssistantItem),
    Tool(ToolItem),
    System(SystemItem),
    Error(ErrorItem),
    Log(LogItem),
}

impl DisplayItem {
    /// Stable rendering identity
    pub fn key(&self) -> &str {
        match self {
            DisplayItem::Thinking(item) => &item.key,
            DisplayItem::Assistant(item) => &item.key,
            DisplayItem::Tool(item) => &item.key,
            DisplayItem::System(item) => &item.key,
            DisplayItem::Error(item) => &item.key,
            DisplayItem::Log(item) => &item.key,
        }
    }

    /// Check if the item may still change
    pub fn is_open(&self) -> bool {
        match self {
            DisplayItem::Thinking(item) => !item.is_complete,
            DisplayItem::Assistant(item) => !item.is_final,
            DisplayItem::Tool(item) => item.status == ToolStatus::Started,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_notice() {
        assert_eq!(classify_notice("Fatal ERROR in agent"), SystemLevel::Error);
        assert_eq!(classify_notice("Warning: key missing"), SystemLevel::Warning);
        assert_eq!(classify_notice("warn: error budget"), SystemLevel::Error);
        assert_eq!(classify_notice("Model: gpt-5"), SystemLevel::Info);
    }

    #[test]
    fn test_item_wire_shape() {
        let item = DisplayItem::Assistant(AssistantItem {
            key: "assistant-1".into(),
            run_id: "r1".into(),
            segment_id: "m1".into(),
            text: "Hi".into(),
            is_final: true,
        });
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "kind": "assistant",
                "key": "assistant-1",
                "runId": "r1",
                "segmentId": "m1",
                "text": "Hi",
                "isFinal": true
            })
        );
        assert_eq!(item.key(), "assistant-1");
        assert!(!item.is_open());
    }

    #[test]
    fn test_tool_item_view() {
        let item = ToolItem {
            key: "tool-0".into(),
            call_id: "c1".into(),
            tool_kind: ToolKind::Terminal,
            label: ToolKind::Terminal.label().into(),
            status: ToolStatus::Completed,
            payload: Some(json!({"args": {"command": "ls"}, "result": {"success": {"exitCode": 0}}})),
        };
        let ToolResultView::Terminal(view) = item.result_view() else {
            panic!("expected terminal view");
        };
        assert_eq!(view.command, "ls");
        assert!(view.is_success);
    }
}

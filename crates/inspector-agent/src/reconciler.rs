//! Event reconciler
//!
//! Folds an ordered list of [`AgentEvent`]s into [`DisplayItem`]s. The fold is
//! deterministic: applying events one at a time and rebuilding from the full
//! history give identical items, keys included. Consumers that receive the
//! whole history on every update can simply call [`build_items`] again.
//!
//! Items live in a single `Vec`; the lookup tables hold indices into it.

use std::collections::HashMap;

use inspector_stream::{
    AgentEvent, AssistantEvent, ThinkingEvent, ThinkingPhase, ToolCallEvent, ToolCallPhase,
};
use serde_json::Value;

use crate::items::{
    AssistantItem, DisplayItem, ErrorItem, LogItem, SystemItem, ThinkingItem, ToolItem,
    ToolStatus, classify_notice,
};
use crate::tool::{ToolKind, detect_tool_key};

/// Log source used when a log event names no channel
pub const DEFAULT_LOG_SOURCE: &str = "stdout";

/// Merge an incoming text fragment into the text seen so far.
///
/// Handles both delta streams and cumulative snapshots: an incoming text that
/// extends the previous one replaces it, a stale prefix is ignored, and
/// anything else is appended.
pub fn reconcile_text(previous: &str, incoming: &str) -> String {
    if incoming.is_empty() || previous == incoming || previous.starts_with(incoming) {
        return previous.to_string();
    }
    if previous.is_empty() || incoming.starts_with(previous) {
        return incoming.to_string();
    }
    format!("{}{}", previous, incoming)
}

/// Fold a full event history into display items
pub fn build_items(events: &[AgentEvent]) -> Vec<DisplayItem> {
    let mut reconciler = Reconciler::new();
    for event in events {
        reconciler.apply(event);
    }
    reconciler.into_items()
}

fn thinking_at(items: &mut [DisplayItem], index: usize) -> Option<&mut ThinkingItem> {
    match items.get_mut(index) {
        Some(DisplayItem::Thinking(item)) => Some(item),
        _ => None,
    }
}

fn assistant_at(items: &mut [DisplayItem], index: usize) -> Option<&mut AssistantItem> {
    match items.get_mut(index) {
        Some(DisplayItem::Assistant(item)) => Some(item),
        _ => None,
    }
}

fn tool_at(items: &mut [DisplayItem], index: usize) -> Option<&mut ToolItem> {
    match items.get_mut(index) {
        Some(DisplayItem::Tool(item)) => Some(item),
        _ => None,
    }
}

/// Incremental fold state for one conversation
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    items: Vec<DisplayItem>,
    counter: u64,

    thinking_by_run: HashMap<String, Vec<usize>>,
    active_thinking: HashMap<String, usize>,
    thinking_sequence: HashMap<String, u32>,

    /// (run id, segment id) → item
    assistant_by_segment: HashMap<(String, String), usize>,
    assistant_by_run: HashMap<String, Vec<usize>>,
    active_assistant: HashMap<String, usize>,
    assistant_sequence: HashMap<String, u32>,

    tool_by_call: HashMap<String, usize>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items folded so far, in creation order
    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<DisplayItem> {
        self.items
    }

    /// Fold one event. Malformed or unexpected events are absorbed.
    pub fn apply(&mut self, event: &AgentEvent) {
        let run_id = event.run_id();
        match event {
            AgentEvent::Thinking(thinking) => self.on_thinking(run_id, thinking),
            AgentEvent::Assistant(assistant) => {
                self.on_assistant(run_id, event.model_call_id(), assistant)
            }
            AgentEvent::Result(_) => self.on_result(run_id),
            AgentEvent::ToolCall(tool) => self.on_tool_call(event.call_id(), tool),
            AgentEvent::System(system) => {
                if let Some(message) = system.notice().filter(|m| !m.is_empty()) {
                    let key = self.next_key("system");
                    self.items.push(DisplayItem::System(SystemItem {
                        key,
                        level: classify_notice(&message),
                        message,
                        run_id: Some(run_id.to_string()),
                    }));
                }
            }
            AgentEvent::Error(error) => {
                if let Some(message) = error.message() {
                    let key = self.next_key("error");
                    self.items.push(DisplayItem::Error(ErrorItem { key, message }));
                }
            }
            AgentEvent::Log(log) => {
                if let Some(text) = log.text.as_deref().filter(|t| !t.is_empty()) {
                    let key = self.next_key("log");
                    let source = log
                        .subtype
                        .as_deref()
                        .filter(|s| !s.is_empty())
                        .unwrap_or(DEFAULT_LOG_SOURCE);
                    self.items.push(DisplayItem::Log(LogItem {
                        key,
                        text: text.to_string(),
                        source: source.to_string(),
                    }));
                }
            }
            AgentEvent::Unknown { kind, .. } => {
                tracing::trace!(kind = %kind, "ignoring unknown event kind");
            }
        }
    }

    fn next_key(&mut self, prefix: &str) -> String {
        let key = format!("{}-{}", prefix, self.counter);
        self.counter += 1;
        key
    }

    fn push(&mut self, item: DisplayItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// The run's open thinking item, started fresh if none is open
    fn ensure_thinking(&mut self, run_id: &str) -> usize {
        if let Some(&index) = self.active_thinking.get(run_id) {
            if self.items.get(index).is_some_and(DisplayItem::is_open) {
                return index;
            }
        }

        let sequence = self.thinking_sequence.entry(run_id.to_string()).or_default();
        *sequence += 1;
        let sequence = *sequence;
        let key = self.next_key("thinking");
        let index = self.push(DisplayItem::Thinking(ThinkingItem {
            key,
            run_id: run_id.to_string(),
            sequence,
            text: String::new(),
            is_complete: false,
            started_at_ms: None,
            completed_at_ms: None,
        }));
        self.thinking_by_run
            .entry(run_id.to_string())
            .or_default()
            .push(index);
        self.active_thinking.insert(run_id.to_string(), index);
        index
    }

    fn on_thinking(&mut self, run_id: &str, event: &ThinkingEvent) {
        let index = self.ensure_thinking(run_id);
        let Some(item) = thinking_at(&mut self.items, index) else {
            return;
        };
        let text = event.text.as_deref().filter(|t| !t.is_empty());
        let timestamp = event.ids.timestamp_ms.filter(|ts| *ts > 0);

        match event.phase() {
            Some(ThinkingPhase::Delta) => {
                if let Some(text) = text {
                    item.text.push_str(text);
                }
                if let Some(ts) = timestamp {
                    item.started_at_ms.get_or_insert(ts);
                }
                item.is_complete = false;
            }
            Some(ThinkingPhase::Completed) => {
                item.is_complete = true;
                if let Some(text) = text {
                    item.text = text.to_string();
                }
                if let Some(ts) = timestamp {
                    item.completed_at_ms = Some(ts);
                }
                self.active_thinking.remove(run_id);
            }
            None => {}
        }
    }

    fn next_segment_id(&mut self, run_id: &str) -> String {
        let sequence = self.assistant_sequence.entry(run_id.to_string()).or_default();
        *sequence += 1;
        format!("{}-segment-{}", run_id, sequence)
    }

    /// Resolve the assistant item an event's text belongs to
    fn ensure_assistant(&mut self, run_id: &str, model_call_id: Option<&str>) -> usize {
        if let Some(segment_id) = model_call_id {
            let segment = (run_id.to_string(), segment_id.to_string());
            if let Some(&index) = self.assistant_by_segment.get(&segment) {
                return index;
            }
        }

        let active = self
            .active_assistant
            .get(run_id)
            .copied()
            .filter(|&index| self.items.get(index).is_some_and(DisplayItem::is_open));

        let index = match active {
            Some(index) => index,
            None => {
                let segment_id = match model_call_id {
                    Some(segment_id) => segment_id.to_string(),
                    None => self.next_segment_id(run_id),
                };
                let key = self.next_key("assistant");
                let index = self.push(DisplayItem::Assistant(AssistantItem {
                    key,
                    run_id: run_id.to_string(),
                    segment_id: segment_id.clone(),
                    text: String::new(),
                    is_final: false,
                }));
                self.active_assistant.insert(run_id.to_string(), index);
                self.assistant_by_segment
                    .insert((run_id.to_string(), segment_id), index);
                self.assistant_by_run
                    .entry(run_id.to_string())
                    .or_default()
                    .push(index);
                index
            }
        };

        // A model call id arriving for a synthesized segment re-keys it
        if let Some(segment_id) = model_call_id {
            if let Some(item) = assistant_at(&mut self.items, index) {
                if item.segment_id != segment_id {
                    let previous = std::mem::replace(&mut item.segment_id, segment_id.to_string());
                    self.assistant_by_segment
                        .remove(&(run_id.to_string(), previous));
                    self.assistant_by_segment
                        .insert((run_id.to_string(), segment_id.to_string()), index);
                }
            }
        }

        index
    }

    fn on_assistant(&mut self, run_id: &str, model_call_id: Option<&str>, event: &AssistantEvent) {
        let text = event.text();
        if text.is_empty() {
            return;
        }
        let index = self.ensure_assistant(run_id, model_call_id);
        if let Some(item) = assistant_at(&mut self.items, index) {
            item.text = reconcile_text(&item.text, &text);
            item.is_final = model_call_id.is_some();
        }
        if model_call_id.is_some() {
            self.active_assistant.remove(run_id);
        }
    }

    /// Close every thinking and assistant item of the run
    fn on_result(&mut self, run_id: &str) {
        for &index in self.assistant_by_run.get(run_id).into_iter().flatten() {
            if let Some(item) = assistant_at(&mut self.items, index) {
                item.is_final = true;
            }
        }
        self.active_assistant.remove(run_id);

        for &index in self.thinking_by_run.get(run_id).into_iter().flatten() {
            if let Some(item) = thinking_at(&mut self.items, index) {
                item.is_complete = true;
            }
        }
        self.active_thinking.remove(run_id);
    }

    fn on_tool_call(&mut self, call_id: Option<&str>, event: &ToolCallEvent) {
        let tool_call = event.tool_call.as_ref();
        let tool_key = tool_call.and_then(detect_tool_key);
        let call_id = call_id
            .or(tool_key)
            .map(str::to_string)
            .unwrap_or_else(|| format!("tool-{}", self.tool_by_call.len()));

        let index = match self.tool_by_call.get(&call_id) {
            Some(&index) => index,
            None => {
                let tool_kind = ToolKind::from_key(tool_key);
                let key = self.next_key("tool");
                let index = self.push(DisplayItem::Tool(ToolItem {
                    key,
                    call_id: call_id.clone(),
                    tool_kind,
                    label: tool_kind.label().to_string(),
                    status: ToolStatus::Started,
                    payload: None,
                }));
                self.tool_by_call.insert(call_id, index);
                index
            }
        };

        // Status only moves forward; a repeated `started` is a no-op
        if event.phase() != Some(ToolCallPhase::Completed) {
            return;
        }
        let Some(item) = tool_at(&mut self.items, index) else {
            return;
        };
        item.status = ToolStatus::Completed;
        let payload = match (tool_key, tool_call) {
            (Some(key), Some(tool_call)) => tool_call.get(key).cloned(),
            (None, Some(tool_call)) => Some(Value::Object(tool_call.clone())),
            (_, None) => None,
        };
        if payload.is_some() {
            item.payload = payload;
        }
    }
}

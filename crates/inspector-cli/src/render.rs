//! Plain-text rendering of display items

use std::collections::HashMap;

use inspector_agent::tool::GrepOutcome;
use inspector_agent::{DisplayItem, ToolItem, ToolResultView, ToolStatus};

use crate::utils::{first_line, truncate_chars};

const PREVIEW_CHARS: usize = 200;

/// One summary line per item
pub fn render_item(item: &DisplayItem) -> String {
    match item {
        DisplayItem::Thinking(thinking) => {
            let marker = if thinking.is_complete { "" } else { " ..." };
            format!(
                "[thinking] {}{}",
                truncate_chars(&first_line(&thinking.text), PREVIEW_CHARS),
                marker
            )
        }
        DisplayItem::Assistant(assistant) => assistant.text.clone(),
        DisplayItem::Tool(tool) => render_tool(tool),
        DisplayItem::System(system) => format!("[{}] {}", system.level.as_str(), system.message),
        DisplayItem::Error(error) => format!("Error: {}", error.message),
        DisplayItem::Log(log) => format!("[{}] {}", log.source, log.text),
    }
}

/// Incremental text output for a live run.
///
/// Closed items are printed in order, stopping at the first open one. A closed
/// item can still grow (a later snapshot merging into a final segment), so each
/// key remembers its last printed line and is printed again when it changes.
#[derive(Debug, Default)]
pub struct TextPrinter {
    printed: HashMap<String, String>,
}

impl TextPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines not yet printed for `items`; `include_open` also flushes open items
    pub fn pending(&mut self, items: &[DisplayItem], include_open: bool) -> Vec<String> {
        let mut lines = Vec::new();
        for item in items {
            if item.is_open() && !include_open {
                break;
            }
            let line = render_item(item);
            if self.printed.get(item.key()) != Some(&line) {
                self.printed.insert(item.key().to_string(), line.clone());
                lines.push(line);
            }
        }
        lines
    }
}

fn render_tool(tool: &ToolItem) -> String {
    if tool.status == ToolStatus::Started {
        return format!("[{}...]", tool.label);
    }
    let detail = match tool.result_view() {
        ToolResultView::Grep(view) => match view.outcome {
            GrepOutcome::Success(_) => format!("{} in {}", view.pattern, view.path),
            GrepOutcome::Error { message } => format!("{} failed: {}", view.pattern, message),
        },
        ToolResultView::Read(view) => match view.total_lines {
            Some(lines) => format!("{} ({} lines)", view.path, lines),
            None => view.path,
        },
        ToolResultView::Edit(view) => {
            format!("{} (+{} -{})", view.path, view.lines_added, view.lines_removed)
        }
        ToolResultView::Ls(view) => view
            .root
            .get("absPath")
            .and_then(|path| path.as_str())
            .unwrap_or("")
            .to_string(),
        ToolResultView::Terminal(view) => {
            let status = match view.exit_code {
                Some(code) => format!("exit {}", code),
                None if view.is_error => "failed".to_string(),
                None => "done".to_string(),
            };
            format!("$ {} ({})", view.command, status)
        }
        ToolResultView::Generic { payload } => payload
            .map(|payload| truncate_chars(&payload.to_string(), PREVIEW_CHARS))
            .unwrap_or_default(),
    };
    format!("[{}: {}]", tool.label, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector_agent::{Reconciler, SystemItem, SystemLevel, ToolKind};
    use inspector_stream::AgentEvent;
    use serde_json::json;

    #[test]
    fn test_render_tool_lines() {
        let mut tool = ToolItem {
            key: "tool-0".into(),
            call_id: "c1".into(),
            tool_kind: ToolKind::Terminal,
            label: "Running command".into(),
            status: ToolStatus::Started,
            payload: None,
        };
        assert_eq!(render_tool(&tool), "[Running command...]");

        tool.status = ToolStatus::Completed;
        tool.payload = Some(json!({"args": {"command": "cargo fmt"}, "result": {"success": {"exitCode": 0}}}));
        assert_eq!(render_tool(&tool), "[Running command: $ cargo fmt (exit 0)]");
    }

    #[test]
    fn test_render_system() {
        let item = DisplayItem::System(SystemItem {
            key: "system-0".into(),
            level: SystemLevel::Warning,
            message: "Warning: slow".into(),
            run_id: None,
        });
        assert_eq!(render_item(&item), "[warning] Warning: slow");
    }

    #[test]
    fn test_text_printer_reprints_grown_segment() {
        let snapshot = |text: &str| {
            AgentEvent::from_value(json!({
                "type": "assistant",
                "session_id": "r1",
                "model_call_id": "m1",
                "message": {"content": [{"type": "text", "text": text}]}
            }))
            .unwrap()
        };
        let mut reconciler = Reconciler::new();
        let mut printer = TextPrinter::new();

        reconciler.apply(&snapshot("Hello"));
        assert_eq!(printer.pending(reconciler.items(), false), vec!["Hello"]);

        reconciler.apply(&snapshot("Hello world"));
        assert_eq!(printer.pending(reconciler.items(), false), vec!["Hello world"]);
        assert!(printer.pending(reconciler.items(), true).is_empty());
    }

    #[test]
    fn test_text_printer_waits_for_open_items() {
        let event = |value| AgentEvent::from_value(value).unwrap();
        let mut reconciler = Reconciler::new();
        let mut printer = TextPrinter::new();

        reconciler.apply(&event(json!({"type": "thinking", "subtype": "delta", "text": "hm"})));
        reconciler.apply(&event(json!({"type": "system", "message": "Model: gpt-5"})));
        assert!(printer.pending(reconciler.items(), false).is_empty());

        let lines = printer.pending(reconciler.items(), true);
        assert_eq!(lines, vec!["[thinking] hm ...", "[info] Model: gpt-5"]);
    }
}

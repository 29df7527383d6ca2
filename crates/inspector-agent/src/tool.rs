//! Tool call classification and result views
//!
//! The agent reports a tool call as a map holding one key that ends in
//! [`TOOL_CALL_SUFFIX`] (`grepToolCall`, `readToolCall`, ...). The tables here
//! map that key to a [`ToolKind`] and a display label, and turn a completed
//! call's payload into a typed view for renderers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Suffix shared by every tool-call payload key
pub const TOOL_CALL_SUFFIX: &str = "ToolCall";

/// Kind of tool an agent invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Grep,
    Read,
    Edit,
    Write,
    Ls,
    Terminal,
    Unknown,
}

/// Payload key → kind
const KEY_KINDS: &[(&str, ToolKind)] = &[
    ("grepToolCall", ToolKind::Grep),
    ("readToolCall", ToolKind::Read),
    ("editToolCall", ToolKind::Edit),
    ("writeToolCall", ToolKind::Write),
    ("lsToolCall", ToolKind::Ls),
    ("terminalToolCall", ToolKind::Terminal),
];

impl ToolKind {
    /// Classify a payload key; unknown or absent keys give [`ToolKind::Unknown`]
    pub fn from_key(key: Option<&str>) -> Self {
        key.and_then(|key| {
            KEY_KINDS
                .iter()
                .find(|(candidate, _)| *candidate == key)
                .map(|(_, kind)| *kind)
        })
        .unwrap_or(ToolKind::Unknown)
    }

    /// Human label shown while the call runs
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Grep => "Grepping",
            ToolKind::Read => "Reading",
            ToolKind::Edit => "Editing",
            ToolKind::Write => "Writing",
            ToolKind::Ls => "Listing",
            ToolKind::Terminal => "Running command",
            ToolKind::Unknown => "Running tool",
        }
    }
}

/// First payload key ending in [`TOOL_CALL_SUFFIX`]
pub fn detect_tool_key(tool_call: &Map<String, Value>) -> Option<&str> {
    tool_call
        .keys()
        .find(|key| key.ends_with(TOOL_CALL_SUFFIX))
        .map(String::as_str)
}

/// Outcome of a grep call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GrepOutcome {
    Success(Value),
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepView {
    pub pattern: String,
    pub path: String,
    pub case_insensitive: bool,
    pub multiline: bool,
    pub args: Value,
    pub outcome: GrepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadView {
    pub call_id: String,
    pub path: String,
    pub content: String,
    pub read_range: Option<Value>,
    pub is_empty: bool,
    pub exceeded_limit: bool,
    pub total_lines: Option<u64>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditView {
    pub call_id: String,
    pub path: String,
    pub diff: String,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub new_file: bool,
    pub before_preview: Option<String>,
    pub after_preview: Option<String>,
    pub result_for_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LsView {
    pub call_id: String,
    pub root: Value,
    pub counts: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalView {
    pub command: String,
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub is_error: bool,
    pub is_success: bool,
}

/// Typed rendering of a tool payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ToolResultView {
    Grep(GrepView),
    Read(ReadView),
    Edit(EditView),
    Ls(LsView),
    Terminal(TerminalView),
    Generic { payload: Option<Value> },
}

impl ToolResultView {
    /// Build the view for a call; falls back to `Generic` when the payload
    /// lacks the shape the kind expects (e.g. the call is still running)
    pub fn build(kind: ToolKind, call_id: &str, payload: Option<&Value>) -> Self {
        let view = payload.and_then(|payload| match kind {
            ToolKind::Grep => Some(ToolResultView::Grep(grep_view(payload))),
            ToolKind::Read => read_view(call_id, payload).map(ToolResultView::Read),
            ToolKind::Edit => edit_view(call_id, payload).map(ToolResultView::Edit),
            ToolKind::Ls => ls_view(call_id, payload).map(ToolResultView::Ls),
            ToolKind::Terminal => Some(ToolResultView::Terminal(terminal_view(payload))),
            ToolKind::Write | ToolKind::Unknown => None,
        });
        view.unwrap_or_else(|| ToolResultView::Generic {
            payload: payload.cloned(),
        })
    }
}

/// First present, non-null value among alternative keys
fn field<'a>(object: Option<&'a Value>, keys: &[&str]) -> Option<&'a Value> {
    let object = object?;
    keys.iter()
        .filter_map(|key| object.get(key))
        .find(|value| !value.is_null())
}

fn string_field(object: Option<&Value>, keys: &[&str]) -> Option<String> {
    field(object, keys).and_then(Value::as_str).map(str::to_string)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn success(payload: &Value) -> Option<&Value> {
    payload.pointer("/result/success").filter(|value| !value.is_null())
}

/// Error text from a string or an object's `message`
pub fn normalize_error(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(object)) => object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string(),
        _ => "Unknown error".to_string(),
    }
}

fn grep_view(payload: &Value) -> GrepView {
    let args = payload.get("args").cloned().unwrap_or(Value::Null);
    let outcome = match success(payload) {
        Some(success) => GrepOutcome::Success(success.clone()),
        None => GrepOutcome::Error {
            message: normalize_error(payload.pointer("/result/error")),
        },
    };
    GrepView {
        pattern: string_field(Some(&args), &["pattern"]).unwrap_or_default(),
        path: string_field(Some(&args), &["path"]).unwrap_or_default(),
        case_insensitive: truthy(args.get("caseInsensitive")),
        multiline: truthy(args.get("multiline")),
        args,
        outcome,
    }
}

fn read_view(call_id: &str, payload: &Value) -> Option<ReadView> {
    let success = success(payload)?;
    Some(ReadView {
        call_id: call_id.to_string(),
        path: string_field(Some(success), &["path"])
            .or_else(|| string_field(payload.get("args"), &["path"]))
            .unwrap_or_default(),
        content: string_field(Some(success), &["content"]).unwrap_or_default(),
        read_range: field(Some(success), &["readRange", "read_range"]).cloned(),
        is_empty: truthy(success.get("isEmpty")),
        exceeded_limit: truthy(success.get("exceededLimit")),
        total_lines: success.get("totalLines").and_then(Value::as_u64),
        file_size: success.get("fileSize").and_then(Value::as_u64),
    })
}

fn count_field(object: &Value, keys: &[&str]) -> u64 {
    match field(Some(object), keys) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn edit_view(call_id: &str, payload: &Value) -> Option<EditView> {
    let success = success(payload)?;
    let before = string_field(
        Some(success),
        &["beforeFullFileContent", "before_full_file_content"],
    );
    let after = string_field(
        Some(success),
        &["afterFullFileContent", "after_full_file_content"],
    );
    let diff = string_field(Some(success), &["diffString", "diff_string"]).unwrap_or_default();
    Some(EditView {
        call_id: call_id.to_string(),
        path: string_field(Some(success), &["path"])
            .or_else(|| string_field(payload.get("args"), &["path"]))
            .unwrap_or_default(),
        diff: decode_html_entities(&diff),
        lines_added: count_field(success, &["linesAdded", "lines_added"]),
        lines_removed: count_field(success, &["linesRemoved", "lines_removed"]),
        new_file: before.as_deref().is_none_or(str::is_empty)
            && after.as_deref().is_some_and(|after| !after.is_empty()),
        before_preview: before.as_deref().map(decode_html_entities),
        after_preview: after.as_deref().map(decode_html_entities),
        result_for_model: string_field(Some(success), &["resultForModel", "result_for_model"]),
    })
}

fn ls_view(call_id: &str, payload: &Value) -> Option<LsView> {
    let success = success(payload)?;
    let root = success.get("directoryTreeRoot").unwrap_or(success);
    let counts = root
        .get("fullSubtreeExtensionCounts")
        .or_else(|| success.get("fullSubtreeExtensionCounts"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    Some(LsView {
        call_id: call_id.to_string(),
        root: root.clone(),
        counts,
    })
}

fn terminal_view(payload: &Value) -> TerminalView {
    let args = payload.get("args");
    let success = success(payload);
    let error = payload.pointer("/result/error").filter(|value| !value.is_null());

    let command = string_field(success, &["command"])
        .or_else(|| string_field(args, &["command"]))
        .or_else(|| {
            args.and_then(|args| args.get("simpleCommands"))
                .and_then(Value::as_array)
                .map(|commands| {
                    commands
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(" ")
                })
        })
        .unwrap_or_default();
    let exit_code = field(success, &["exitCode"])
        .or_else(|| field(error, &["exitCode"]))
        .and_then(Value::as_i64);
    let stdout = string_field(success, &["stdout"])
        .or_else(|| string_field(error, &["stdout"]))
        .unwrap_or_default();
    let stderr = string_field(success, &["stderr"])
        .or_else(|| string_field(error, &["stderr"]))
        .unwrap_or_default();
    let is_error = error.is_some();

    TerminalView {
        command,
        exit_code,
        stdout,
        stderr,
        is_error,
        is_success: !is_error && exit_code == Some(0),
    }
}

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&#96;", "`"),
];

static DECIMAL_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#(\d+);").unwrap());
static HEX_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#x([0-9a-fA-F]+);").unwrap());

fn replace_code_points(text: &str, pattern: &Regex, radix: u32) -> String {
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], radix)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Decode the HTML entities the agent escapes diffs with.
///
/// Named entities are replaced in table order (`&amp;` first), then decimal
/// and hex numeric references. Invalid code points are left as written.
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut result = text.to_string();
    for (entity, replacement) in NAMED_ENTITIES {
        if result.contains(entity) {
            result = result.replace(entity, replacement);
        }
    }
    if result.contains("&#") {
        result = replace_code_points(&result, &DECIMAL_ENTITY, 10);
        result = replace_code_points(&result, &HEX_ENTITY, 16);
    }
    result
}

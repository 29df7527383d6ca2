//! inspector-agent: drive a coding agent and fold its output into display items
//!
//! [`ProcessTransport`] runs the agent CLI and streams its output as
//! [`StreamFrame`](inspector_stream::StreamFrame)s; [`Reconciler`] turns the
//! resulting event history into an ordered list of [`DisplayItem`]s.

pub mod conversation;
pub mod error;
pub mod handle;
pub mod items;
pub mod reconciler;
pub mod tool;
pub mod transport;

pub use conversation::{
    ConversationMessage, MessagePart, Role, collect_message_events, extract_last_user_text,
};
pub use error::{Error, Result};
pub use handle::{RunHandle, RunState};
pub use items::{
    AssistantItem, DisplayItem, ErrorItem, LogItem, SystemItem, SystemLevel, ThinkingItem,
    ToolItem, ToolStatus, classify_notice,
};
pub use reconciler::{Reconciler, build_items, reconcile_text};
pub use tool::{ToolKind, ToolResultView, decode_html_entities, detect_tool_key};
pub use transport::{
    DEFAULT_API_KEY_ENV, DEFAULT_ARGS, DEFAULT_PROGRAM, ProcessConfig, ProcessTransport,
    RunRequest, Transport, build_args, model_from_args,
};

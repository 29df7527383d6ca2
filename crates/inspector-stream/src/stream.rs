//! Outbound frame protocol and sinks

use crate::types::AgentEvent;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Part-type discriminator of frames that wrap one agent event
pub const AGENT_EVENT_PART: &str = "data-agentEvent";

/// Per-invocation metadata carried by `start`, `message-metadata` and `finish`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Unix milliseconds when the invocation began
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

/// Incremental metadata update; `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataPatch {
    pub run_id: Option<String>,
    pub model: Option<String>,
}

impl MessageMetadata {
    /// Metadata stamped with the current time
    pub fn new() -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }

    /// Apply a patch, returning whether any field changed
    pub fn apply(&mut self, patch: MetadataPatch) -> bool {
        let mut changed = false;
        if let Some(run_id) = patch.run_id {
            if self.run_id.as_deref() != Some(run_id.as_str()) {
                self.run_id = Some(run_id);
                changed = true;
            }
        }
        if let Some(model) = patch.model {
            if self.model.as_deref() != Some(model.as_str()) {
                self.model = Some(model);
                changed = true;
            }
        }
        changed
    }
}

/// One unit of the outbound protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamFrame {
    /// Opens the response; sent once, before any other frame
    Start { message_metadata: MessageMetadata },
    /// Full metadata snapshot after a change
    MessageMetadata { message_metadata: MessageMetadata },
    /// One decoded agent event
    #[serde(rename = "data-agentEvent")]
    AgentEvent { id: String, data: AgentEvent },
    /// Closes the response; always the last frame
    Finish { message_metadata: MessageMetadata },
}

impl StreamFrame {
    /// Check if this is the terminal frame
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Finish { .. })
    }

    /// The wrapped event, for data frames
    pub fn event(&self) -> Option<&AgentEvent> {
        match self {
            StreamFrame::AgentEvent { data, .. } => Some(data),
            _ => None,
        }
    }

    /// The metadata snapshot, for framing frames
    pub fn metadata(&self) -> Option<&MessageMetadata> {
        match self {
            StreamFrame::Start { message_metadata }
            | StreamFrame::MessageMetadata { message_metadata }
            | StreamFrame::Finish { message_metadata } => Some(message_metadata),
            StreamFrame::AgentEvent { .. } => None,
        }
    }
}

/// Agent events carried by data frames, in order; framing frames are skipped
pub fn collect_agent_events<'a>(frames: impl IntoIterator<Item = &'a StreamFrame>) -> Vec<AgentEvent> {
    frames
        .into_iter()
        .filter_map(StreamFrame::event)
        .cloned()
        .collect()
}

/// Destination for outbound frames
pub trait FrameSink: Send {
    fn write(&mut self, frame: StreamFrame);
}

impl FrameSink for Vec<StreamFrame> {
    fn write(&mut self, frame: StreamFrame) {
        self.push(frame);
    }
}

impl FrameSink for tokio::sync::mpsc::UnboundedSender<StreamFrame> {
    fn write(&mut self, frame: StreamFrame) {
        if self.send(frame).is_err() {
            tracing::debug!("frame receiver dropped; discarding frame");
        }
    }
}

/// A stream of outbound frames
pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

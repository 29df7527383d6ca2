//! inspector-stream: wire layer for coding-agent output
//!
//! This crate turns the raw stdout/stderr byte streams of an agent process into
//! decoded [`AgentEvent`]s and defines the framed protocol ([`StreamFrame`])
//! used to hand those events to a consumer.

pub mod decoder;
pub mod demux;
pub mod error;
pub mod stream;
pub mod types;

pub use decoder::{EventDecoder, decode_line};
pub use demux::{Channel, LineDemux};
pub use error::{Error, Result};
pub use stream::{
    AGENT_EVENT_PART, FrameSink, FrameStream, MessageMetadata, MetadataPatch, StreamFrame,
    collect_agent_events,
};
pub use types::*;

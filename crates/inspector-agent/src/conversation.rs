//! Conversation turns exchanged with the agent

use inspector_stream::{AgentEvent, StreamFrame};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One part of a conversation message, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    /// An agent event carried by an assistant message
    #[serde(rename = "data-agentEvent")]
    AgentEvent { id: String, data: AgentEvent },
    /// Parts this crate does not interpret (files, tool UI state, ...)
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl ConversationMessage {
    /// Create a user message with a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// Create an empty assistant message to fold frames into
    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            parts: Vec::new(),
        }
    }

    /// Text of the first text part, if any
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Fold an outbound frame into this message.
    ///
    /// Data frames become [`MessagePart::AgentEvent`] parts; framing frames
    /// carry no content and are skipped. Returns whether a part was added.
    pub fn append_frame(&mut self, frame: &StreamFrame) -> bool {
        match frame {
            StreamFrame::AgentEvent { id, data } => {
                self.parts.push(MessagePart::AgentEvent {
                    id: id.clone(),
                    data: data.clone(),
                });
                true
            }
            _ => false,
        }
    }

    /// Agent events held by this message, in order
    pub fn agent_events(&self) -> impl Iterator<Item = &AgentEvent> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::AgentEvent { data, .. } => Some(data),
            _ => None,
        })
    }
}

/// Newest user message's first text part, skipping messages where it is empty
pub fn extract_last_user_text(messages: &[ConversationMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .filter(|message| message.role == Role::User)
        .find_map(|message| message.first_text().filter(|text| !text.is_empty()))
}

/// Agent events from every assistant message, in conversation order
pub fn collect_message_events(messages: &[ConversationMessage]) -> Vec<AgentEvent> {
    messages
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .flat_map(ConversationMessage::agent_events)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector_stream::MessageMetadata;
    use serde_json::json;

    #[test]
    fn test_extract_last_user_text() {
        let messages = vec![
            ConversationMessage::user("first"),
            ConversationMessage::assistant(),
            ConversationMessage::user(""),
            ConversationMessage {
                role: Role::System,
                parts: vec![MessagePart::Text { text: "sys".into() }],
            },
        ];
        assert_eq!(extract_last_user_text(&messages), Some("first"));
        assert_eq!(extract_last_user_text(&[]), None);
    }

    #[test]
    fn test_parts_parse_from_ui_messages() {
        let message: ConversationMessage = serde_json::from_value(json!({
            "role": "assistant",
            "parts": [
                {"type": "step-start"},
                {"type": "data-agentEvent", "id": "event-0", "data": {"type": "log", "text": "hi"}},
                {"type": "text", "text": "done"}
            ]
        }))
        .unwrap();
        assert_eq!(message.parts[0], MessagePart::Other);
        assert_eq!(message.agent_events().count(), 1);
        assert_eq!(message.first_text(), Some("done"));
    }

    #[test]
    fn test_append_frame_and_collect() {
        let mut reply = ConversationMessage::assistant();
        assert!(!reply.append_frame(&StreamFrame::Start {
            message_metadata: MessageMetadata::default(),
        }));
        assert!(reply.append_frame(&StreamFrame::AgentEvent {
            id: "event-0".into(),
            data: AgentEvent::system("ready"),
        }));

        let mut echoed = ConversationMessage::user("prompt");
        echoed.parts.push(MessagePart::AgentEvent {
            id: "event-9".into(),
            data: AgentEvent::system("ignored"),
        });

        let events = collect_message_events(&[echoed, reply]);
        assert_eq!(events, vec![AgentEvent::system("ready")]);
    }
}

//! Per-conversation state: the message history and the active session.

use std::sync::Arc;

use crate::llm::{Content, ContentBlock, Message, Role};
use crate::session::Session;
use crate::types::ConversationId;

/// One observation tied to the invocation request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub request_id: String,
    pub content: String,
    pub is_error: bool,
}

/// History grows by appending only; the session is attached once.
#[derive(Debug, Default)]
pub struct ConversationState {
    id: ConversationId,
    messages: Vec<Message>,
    session: Option<Arc<Session>>,
}

impl ConversationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(id: ConversationId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn id(&self) -> &ConversationId {
        &self.id
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn attach_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Record the model's step verbatim, including any action requests.
    pub fn push_assistant(&mut self, blocks: Vec<ContentBlock>) {
        self.messages.push(Message::assistant_blocks(blocks));
    }

    /// Record all observations of one action step as a single message,
    /// preserving their order.
    pub fn push_observations(&mut self, observations: Vec<Observation>) {
        if observations.is_empty() {
            return;
        }
        let blocks = observations
            .into_iter()
            .map(|o| ContentBlock::tool_result(o.request_id, o.content, o.is_error))
            .collect();
        self.messages.push(Message {
            role: Role::User,
            content: Content::Blocks(blocks),
        });
    }

    /// Text of the last assistant message, if any.
    #[must_use]
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.content.first_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observations_keep_request_order() {
        let mut state = ConversationState::new();
        state.push_user("What is 10 + 20 and 5 - 2?");
        state.push_assistant(vec![
            ContentBlock::ToolUse {
                id: "a".into(),
                name: "add".into(),
                input: json!({"a": 10, "b": 20}),
            },
            ContentBlock::ToolUse {
                id: "b".into(),
                name: "subtract".into(),
                input: json!({"a": 5, "b": 2}),
            },
        ]);
        state.push_observations(vec![
            Observation {
                request_id: "a".into(),
                content: "30".into(),
                is_error: false,
            },
            Observation {
                request_id: "b".into(),
                content: "3".into(),
                is_error: false,
            },
        ]);

        assert_eq!(state.messages().len(), 3);
        let ids: Vec<_> = state.messages()[2]
            .content
            .blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_observations_append_nothing() {
        let mut state = ConversationState::new();
        state.push_observations(Vec::new());
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_last_answer() {
        let mut state = ConversationState::new();
        assert!(state.last_answer().is_none());

        state.push_user("hi");
        state.push_assistant(vec![ContentBlock::Text {
            text: "The result is 30.".into(),
        }]);
        assert_eq!(state.last_answer(), Some("The result is 30."));
        assert!(state.session().is_none());
    }
}

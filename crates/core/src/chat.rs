//! Chat message types shared between the HTTP layer and the reasoning engine.

use serde::{Deserialize, Serialize};

/// Message roles accepted in conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Prepend a synthetic system entry carrying the caller identifier, so
/// caller-scoped tools (prescription lookups) can resolve who they serve.
/// Returns the history untouched when no identifier is present.
pub fn with_user_context(
    messages: Vec<ChatMessage>,
    user_identifier: Option<&str>,
) -> Vec<ChatMessage> {
    let Some(identifier) = user_identifier else {
        return messages;
    };

    let context = ChatMessage::system(format!(
        "## User Context\n\
         The current user's identifier for prescription lookups is: {identifier}\n\
         Use this identifier when calling the prescription_management tool."
    ));

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(context);
    out.extend(messages);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);

        let roundtrip: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, msg);
    }

    #[test]
    fn test_user_context_prepended() {
        let history = vec![ChatMessage::user("refill my statins")];
        let with_ctx = with_user_context(history, Some("jane@example.com"));

        assert_eq!(with_ctx.len(), 2);
        assert_eq!(with_ctx[0].role, Role::System);
        assert!(with_ctx[0].content.contains("jane@example.com"));
        assert_eq!(with_ctx[1].role, Role::User);
    }

    #[test]
    fn test_no_identifier_leaves_history_untouched() {
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello, how can I help?"),
        ];
        let out = with_user_context(history.clone(), None);
        assert_eq!(out, history);
    }
}

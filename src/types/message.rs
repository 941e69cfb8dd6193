//! Message types for model communication.

use serde::{Deserialize, Serialize};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

impl ModelMessage {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }

    /// Rough token estimate (four characters per token).
    pub fn estimated_tokens(&self) -> u32 {
        let chars = self.content.chars().count() as u32;
        chars.div_ceil(4)
    }
}

/// Estimate the prompt size of a whole conversation.
pub fn estimate_tokens(messages: &[ModelMessage]) -> u32 {
    messages.iter().map(ModelMessage::estimated_tokens).sum()
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(ModelMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn token_estimate_rounds_up() {
        let messages = vec![ModelMessage::system("abcde"), ModelMessage::user("abcd")];
        assert_eq!(estimate_tokens(&messages), 3);
        assert_eq!(estimate_tokens(&[]), 0);
    }
}

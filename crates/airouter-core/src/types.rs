//! Provider-agnostic conversation types

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// What a caller hands to the router: a bare prompt or a message history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteInput {
    Prompt(String),
    Messages(Vec<ChatMessage>),
}

impl From<&str> for RouteInput {
    fn from(prompt: &str) -> Self {
        Self::Prompt(prompt.to_string())
    }
}

impl From<String> for RouteInput {
    fn from(prompt: String) -> Self {
        Self::Prompt(prompt)
    }
}

impl From<Vec<ChatMessage>> for RouteInput {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self::Messages(messages)
    }
}

/// A validated, non-empty conversation whose last message carries text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(messages: Vec<ChatMessage>) -> Result<Self, RouterError> {
        let Some(last) = messages.last() else {
            return Err(RouterError::InvalidInput(
                "conversation must contain at least one message".to_string(),
            ));
        };
        if last.content.trim().is_empty() {
            return Err(RouterError::InvalidInput(
                "last message has no text".to_string(),
            ));
        }
        Ok(Self { messages })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The message that gets classified and routed
    pub fn last_text(&self) -> &str {
        // Non-empty by construction
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// Total character count across every message
    pub fn char_count(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

impl TryFrom<RouteInput> for Conversation {
    type Error = RouterError;

    fn try_from(input: RouteInput) -> Result<Self, Self::Error> {
        match input {
            RouteInput::Prompt(prompt) => Self::new(vec![ChatMessage::user(prompt)]),
            RouteInput::Messages(messages) => Self::new(messages),
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

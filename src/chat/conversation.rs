use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::llm::{ChatMessage, ChatRequest, ValidationError};

/// Sampling presets offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Behavior {
    Accurate,
    #[default]
    Balanced,
    Creative,
}

impl Behavior {
    pub const ALL: [Behavior; 3] = [Behavior::Accurate, Behavior::Balanced, Behavior::Creative];

    pub fn temperature(self) -> f64 {
        match self {
            Behavior::Accurate => 0.0,
            Behavior::Balanced => 0.7,
            Behavior::Creative => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Behavior::Accurate => "Accurate",
            Behavior::Balanced => "Balanced",
            Behavior::Creative => "Creative",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Behavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Behavior::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown behavior {s:?} (expected accurate, balanced or creative)")
            })
    }
}

impl TryFrom<String> for Behavior {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// In-memory conversation history, oldest turn first.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Removes and returns the most recent turn.
    pub fn pop(&mut self) -> Option<ChatMessage> {
        self.messages.pop()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Snapshot of the whole history as a request for `model`.
    pub fn request(&self, model: &str, behavior: Behavior) -> Result<ChatRequest, ValidationError> {
        ChatRequest::new(model, Some(behavior.temperature()), self.messages.clone())
    }
}

//! Validated chat request.
//!
//! A `ChatRequest` is built fresh for every user turn and never mutated
//! afterwards. Construction is the only place where temperature bounds and
//! message shape are checked; once built, a request can be sent as-is.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Temperature used when the caller does not provide one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A chat completion request: model, sampling temperature and history
/// (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    model: String,
    temperature: Option<f64>,
    messages: Vec<ChatMessage>,
}

/// Untyped shape accepted by [`ChatRequest::from_json`].
#[derive(Deserialize)]
struct RawChatRequest {
    model: String,
    #[serde(default = "default_temperature")]
    temperature: Option<f64>,
    messages: Vec<ChatMessage>,
}

fn default_temperature() -> Option<f64> {
    Some(DEFAULT_TEMPERATURE)
}

impl ChatRequest {
    /// Builds a request, rejecting an empty model, an empty role or a
    /// temperature outside `[0.0, 1.0]`.
    ///
    /// `None` is a legitimate temperature: the server then uses its own
    /// default and `null` goes on the wire.
    pub fn new(
        model: impl Into<String>,
        temperature: Option<f64>,
        messages: Vec<ChatMessage>,
    ) -> Result<Self, ValidationError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ValidationError::EmptyModel);
        }

        if let Some(t) = temperature {
            // NaN fails the range check too
            if !(0.0..=1.0).contains(&t) {
                return Err(ValidationError::TemperatureOutOfRange(t));
            }
        }

        if let Some(index) = messages.iter().position(|m| m.role.trim().is_empty()) {
            return Err(ValidationError::EmptyRole { index });
        }

        Ok(Self {
            model,
            temperature,
            messages,
        })
    }

    pub fn with_default_temperature(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
    ) -> Result<Self, ValidationError> {
        Self::new(model, Some(DEFAULT_TEMPERATURE), messages)
    }

    /// Parses and validates a request from JSON.
    ///
    /// `model` and `messages` are required; `temperature` defaults to 0.7
    /// when absent and may be `null`.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let raw: RawChatRequest =
            serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::new(raw.model, raw.temperature, raw.messages)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

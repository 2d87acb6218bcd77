//! `ChatBackend` trait — the seam between the chat session and the server.
//!
//! `OllamaClient` is the only real implementation; the session is generic
//! over this trait so its turn handling can be exercised without a server.

use async_trait::async_trait;

use super::error::LlmError;
use super::request::ChatRequest;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends the conversation and returns the assistant's reply text.
    async fn reply(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Human-readable description of the backend, e.g. `"ollama (localhost:11434)"`.
    fn description(&self) -> String;
}

pub mod client;
pub mod error;
pub mod ollama;
pub mod request;

pub use client::ChatBackend;
pub use error::{LlmError, ValidationError};
pub use ollama::OllamaClient;
pub use request::{ChatMessage, ChatRequest};

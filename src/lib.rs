//! Minimal chat front-end for a locally hosted Ollama server.
//!
//! [`llm::OllamaClient`] turns a validated [`llm::ChatRequest`] into one
//! `POST /api/chat` call; [`chat::ChatSession`] keeps the conversation and
//! drives the client from a terminal.

pub mod chat;
pub mod config;
pub mod llm;

pub use chat::{Behavior, ChatSession, Conversation};
pub use config::{ChatConfig, Config, ServerConfig};
pub use llm::{ChatBackend, ChatMessage, ChatRequest, LlmError, OllamaClient, ValidationError};

use std::time::Instant;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::llm::{ChatBackend, LlmError};

use super::conversation::{Behavior, Conversation};

/// Marker printed before each user input.
const PROMPT: &str = "you> ";

/// What the front-end should do after one input line.
#[derive(Debug, PartialEq)]
pub enum Turn {
    /// Text to show the user.
    Output(String),
    /// Nothing to show (blank line).
    Nothing,
    /// End the session.
    Quit,
}

/// Interactive chat session over a [`ChatBackend`].
///
/// Owns the conversation history. A user turn is only kept once the
/// backend has answered; failed exchanges leave the history untouched.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    model: String,
    behavior: Behavior,
    conversation: Conversation,
    start_time: Instant,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B, model: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            backend,
            model: model.into(),
            behavior,
            conversation: Conversation::new(),
            start_time: Instant::now(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Reads lines from `reader` until EOF or `/quit`, writing replies to `writer`.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            "Chat session started — {} with {} ({})",
            self.backend.description(),
            self.model,
            self.behavior
        );

        let mut lines = reader.lines();
        loop {
            writer.write_all(PROMPT.as_bytes()).await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                writer.write_all(b"\n").await?;
                break;
            };

            match self.handle_line(&line).await {
                Turn::Output(text) => {
                    writer.write_all(format!("{text}\n\n").as_bytes()).await?;
                }
                Turn::Nothing => {}
                Turn::Quit => break,
            }
        }

        writer.flush().await?;
        info!("Chat session ended after {} turns", self.conversation.len());
        Ok(())
    }

    /// Handles one line of user input.
    pub async fn handle_line(&mut self, line: &str) -> Turn {
        let line = line.trim();
        if line.is_empty() {
            return Turn::Nothing;
        }
        // Slash commands are intercepted before the LLM
        if line.starts_with('/') {
            return self.handle_command(line);
        }
        Turn::Output(self.handle_prompt(line).await)
    }

    // ── Slash commands ────────────────────────────────────

    fn handle_command(&mut self, line: &str) -> Turn {
        let mut parts = line.splitn(2, ' ');
        let command = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

        debug!("Slash command: {command}");

        let text = match command.as_str() {
            "/quit" | "/exit" => return Turn::Quit,
            "/new" | "/reset" => self.cmd_new(),
            "/behavior" => self.cmd_behavior(arg),
            "/model" => self.cmd_model(arg),
            "/history" => self.cmd_history(),
            "/status" => self.cmd_status(),
            "/help" => cmd_help(),
            _ => format!("Unknown command: {command}\nType /help for available commands."),
        };
        Turn::Output(text)
    }

    /// /new — Forget the conversation so far
    fn cmd_new(&mut self) -> String {
        let turns = self.conversation.len();
        self.conversation.clear();
        format!("New conversation started ({turns} messages cleared).")
    }

    /// /behavior [name] — Show or set the sampling preset
    fn cmd_behavior(&mut self, arg: Option<&str>) -> String {
        let Some(name) = arg else {
            let options: Vec<String> = Behavior::ALL
                .iter()
                .map(|b| format!("{b} ({})", b.temperature()))
                .collect();
            return format!(
                "Behavior: {} ({})\nAvailable: {}",
                self.behavior,
                self.behavior.temperature(),
                options.join(", ")
            );
        };
        match name.parse::<Behavior>() {
            Ok(behavior) => {
                self.behavior = behavior;
                info!("Behavior set to {behavior}");
                format!("Behavior set to {behavior} (temperature {}).", behavior.temperature())
            }
            Err(e) => e,
        }
    }

    /// /model [name] — Show or set the model
    fn cmd_model(&mut self, arg: Option<&str>) -> String {
        match arg {
            Some(model) => {
                self.model = model.to_string();
                info!("Model set to {model}");
                format!("Model set to {model}.")
            }
            None => format!("Model: {}", self.model),
        }
    }

    /// /history — Replay the conversation
    fn cmd_history(&self) -> String {
        if self.conversation.is_empty() {
            return "No messages yet.".to_string();
        }
        self.conversation
            .iter()
            .map(|m| format!("[{}] {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// /status — Session overview
    fn cmd_status(&self) -> String {
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;

        format!(
            "Backend: {}\n\
             Model: {}\n\
             Behavior: {} ({})\n\
             Conversation: {} messages\n\
             Uptime: {hours}h {minutes}m",
            self.backend.description(),
            self.model,
            self.behavior,
            self.behavior.temperature(),
            self.conversation.len(),
        )
    }

    // ── LLM turn ─────────────────────────────────────────

    /// Sends the history plus `prompt` and records the answer.
    async fn handle_prompt(&mut self, prompt: &str) -> String {
        self.conversation.push_user(prompt);

        let request = match self.conversation.request(&self.model, self.behavior) {
            Ok(request) => request,
            Err(e) => {
                self.conversation.pop();
                warn!("Invalid chat request: {e}");
                return format!("Invalid request: {e}");
            }
        };

        match self.backend.reply(&request).await {
            Ok(answer) => {
                info!(
                    "Reply from {}: {} chars ({} messages in history)",
                    self.model,
                    answer.chars().count(),
                    self.conversation.len() + 1
                );
                self.conversation.push_assistant(answer.clone());
                answer
            }
            Err(e) => {
                // The failed prompt is not part of the conversation
                self.conversation.pop();
                failure_message(&e)
            }
        }
    }
}

fn failure_message(err: &LlmError) -> String {
    match err {
        LlmError::HttpStatus { status, body, .. } if body.is_empty() => {
            format!("Ollama server error: {status}")
        }
        LlmError::HttpStatus { status, body, .. } => {
            format!("Ollama server error: {status}\n{body}")
        }
        other => format!("Unable to reach the service: {other}"),
    }
}

/// /help — List available commands
fn cmd_help() -> String {
    "\
Commands:\n\
  /new              — Start a new conversation\n\
  /behavior [name]  — Show or set the behavior (accurate, balanced, creative)\n\
  /model [name]     — Show or set the model\n\
  /history          — Show the conversation so far\n\
  /status           — Backend, model and session info\n\
  /help             — This message\n\
  /quit             — Leave"
        .to_string()
}

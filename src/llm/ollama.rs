//! Ollama API client.
//!
//! Calls `POST http://{address}/api/chat` with an Ollama-native request
//! body and hands back the raw response. The client is strictly
//! request/response: `stream` is always `false`.
//!
//! Error policy:
//! - Network failures (refused, DNS, timeout) → `LlmError::Transport`.
//! - Non-2xx status → `LlmError::HttpStatus`, with the start of the body.
//! - Both are logged once at `warn!` and returned; nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::client::ChatBackend;
use super::error::LlmError;
use super::request::{ChatMessage, ChatRequest};
use crate::config::ServerConfig;

/// Maximum number of characters of an error body kept in `HttpStatus`.
const MAX_ERROR_BODY: usize = 512;

// ── Ollama API request types ─────────────────────────────

/// Ollama `/api/chat` request body.
#[derive(Debug, Serialize, PartialEq)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: OllamaOptions,
}

/// Ollama generation options.
///
/// `temperature` is serialized as `null` when unset so the server falls
/// back to the model's own default.
#[derive(Debug, Serialize, PartialEq)]
pub struct OllamaOptions {
    pub temperature: Option<f64>,
}

/// Everything needed to issue one chat call, before any I/O.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub headers: HeaderMap,
    pub body: OllamaChatRequest,
    pub url: Url,
}

// ── Ollama API response types ────────────────────────────

/// Ollama `/api/chat` response. Only `message.content` is required.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ResponseMessage,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

/// Message in an Ollama response.
#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    pub content: String,
}

// ── OllamaClient ────────────────────────────────────────

/// Client for a local Ollama server.
///
/// Built once per process and shared; `reqwest::Client` pools its
/// connections internally.
pub struct OllamaClient {
    client: Client,
    address: String,
    chat_url: Url,
    timeout: Duration,
}

impl OllamaClient {
    /// Creates a client for `config.address`. No network I/O happens here.
    ///
    /// Certificate verification stays on unless `tls_verify = false`.
    pub fn new(config: &ServerConfig) -> Result<Self, LlmError> {
        let chat_url = config.chat_url().map_err(LlmError::Client)?;

        if !config.tls_verify {
            warn!("TLS certificate verification disabled for {}", config.address);
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(!config.tls_verify)
            .no_proxy()
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            client,
            address: config.address.clone(),
            chat_url,
            timeout: config.timeout(),
        })
    }

    /// Overrides the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds headers, body and URL for `request`.
    pub fn build_request(&self, request: &ChatRequest) -> OutgoingRequest {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = OllamaChatRequest {
            model: request.model().to_string(),
            messages: request.messages().to_vec(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature(),
            },
        };

        OutgoingRequest {
            headers,
            body,
            url: self.chat_url.clone(),
        }
    }

    /// Sends `request` and returns the raw response on a 2xx status.
    ///
    /// Body parsing is left to the caller; see [`ChatResponse`].
    pub async fn post(&self, request: &ChatRequest) -> Result<Response, LlmError> {
        let outgoing = self.build_request(request);
        let url = outgoing.url.to_string();

        debug!(
            "Calling Ollama API ({}) with {} messages, temperature {:?}",
            outgoing.body.model,
            outgoing.body.messages.len(),
            outgoing.body.options.temperature
        );

        let response = match self
            .client
            .post(outgoing.url)
            .headers(outgoing.headers)
            .json(&outgoing.body)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => {
                warn!("Request to {url} failed: {source}");
                return Err(LlmError::Transport { url, source });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Cannot read error body from {url}: {e}");
                    String::new()
                }
            };
            warn!("Ollama returned status {status} for {url}");
            return Err(LlmError::HttpStatus {
                status,
                url,
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn reply(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self.post(request).await?;
        let url = response.url().to_string();

        let resp: ChatResponse = response.json().await.map_err(|source| {
            warn!("Cannot decode chat response from {url}: {source}");
            LlmError::Decode { url, source }
        })?;

        if let (Some(input), Some(output)) = (resp.prompt_eval_count, resp.eval_count) {
            info!(
                "LLM response ({}): {input} in / {output} out tokens",
                resp.model.as_deref().unwrap_or(request.model())
            );
        }
        debug!(
            "Response message role {:?}, done_reason {:?}, total_duration {:?}",
            resp.message.role,
            resp.done_reason,
            resp.total_duration.map(Duration::from_nanos)
        );

        Ok(resp.message.content)
    }

    fn description(&self) -> String {
        format!("ollama ({})", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn client_for(address: &str) -> OllamaClient {
        OllamaClient::new(&ServerConfig {
            address: address.to_string(),
            ..ServerConfig::default()
        })
        .unwrap()
    }

    fn hi_request() -> ChatRequest {
        ChatRequest::new("phi3.5", Some(0.7), vec![ChatMessage::user("hi")]).unwrap()
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Reads one HTTP request (head + Content-Length body) from `socket`.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// One-shot HTTP server answering `response` verbatim.
    /// The join handle yields the raw request it received.
    async fn stub_server(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (address, handle)
    }

    // ── Construction ─────────────────────────────────────

    #[test]
    fn test_default_address_and_timeout() {
        let client = OllamaClient::new(&ServerConfig::default()).unwrap();
        assert_eq!(client.description(), "ollama (localhost:11434)");
        assert_eq!(client.timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let result = OllamaClient::new(&ServerConfig {
            address: "not a host".to_string(),
            ..ServerConfig::default()
        });
        assert!(matches!(result, Err(LlmError::Client(_))));
    }

    #[test]
    fn test_address_with_scheme_rejected() {
        for address in ["http://localhost:11434", "localhost:11434/api"] {
            let result = OllamaClient::new(&ServerConfig {
                address: address.to_string(),
                ..ServerConfig::default()
            });
            assert!(matches!(result, Err(LlmError::Client(_))), "{address} accepted");
        }
    }

    #[test]
    fn test_with_timeout() {
        let client = client_for("localhost:11434").with_timeout(Duration::from_millis(250));
        assert_eq!(client.timeout(), Duration::from_millis(250));
    }

    // ── Request building ─────────────────────────────────

    #[test]
    fn test_build_request_body_and_url() {
        let client = client_for("localhost:11434");
        let outgoing = client.build_request(&hi_request());

        assert_eq!(outgoing.url.as_str(), "http://localhost:11434/api/chat");
        assert_eq!(
            serde_json::to_value(&outgoing.body).unwrap(),
            json!({
                "model": "phi3.5",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false,
                "options": {"temperature": 0.7}
            })
        );
    }

    #[test]
    fn test_build_request_headers() {
        let outgoing = client_for("localhost:11434").build_request(&hi_request());
        assert_eq!(outgoing.headers[ACCEPT], "application/json");
        assert_eq!(outgoing.headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_build_request_null_temperature() {
        let request = ChatRequest::new("phi3.5", None, vec![]).unwrap();
        let outgoing = client_for("localhost:11434").build_request(&request);
        let json = serde_json::to_value(&outgoing.body).unwrap();
        assert!(json["options"]["temperature"].is_null());
        assert!(json["options"].get("temperature").is_some());
    }

    #[test]
    fn test_build_request_preserves_order() {
        let client = client_for("localhost:11434");
        let histories = vec![
            vec![],
            vec![ChatMessage::user("only")],
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("second"),
                ChatMessage::user("first"),
                ChatMessage::assistant("fourth"),
                ChatMessage::new("system", "fifth"),
            ],
        ];

        for history in histories {
            let request = ChatRequest::new("phi3.5", Some(0.0), history.clone()).unwrap();
            let body = serde_json::to_value(&client.build_request(&request).body).unwrap();
            let sent: Vec<ChatMessage> = serde_json::from_value(body["messages"].clone()).unwrap();
            assert_eq!(sent, history);
        }
    }

    #[test]
    fn test_build_request_stream_always_false() {
        let outgoing = client_for("127.0.0.1:9999").build_request(&hi_request());
        assert!(!outgoing.body.stream);
        assert_eq!(outgoing.url.as_str(), "http://127.0.0.1:9999/api/chat");
    }

    // ── Response parsing ─────────────────────────────────

    #[test]
    fn test_response_parsing_full() {
        let json = r#"{
            "model": "phi3.5",
            "created_at": "2024-08-01T10:00:00Z",
            "message": {"role": "assistant", "content": "Hello!"},
            "done": true,
            "done_reason": "stop",
            "total_duration": 123456,
            "prompt_eval_count": 12,
            "eval_count": 3
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "Hello!");
        assert_eq!(resp.message.role.as_deref(), Some("assistant"));
        assert_eq!(resp.done_reason.as_deref(), Some("stop"));
        assert_eq!(resp.prompt_eval_count, Some(12));
        assert_eq!(resp.eval_count, Some(3));
    }

    #[test]
    fn test_response_parsing_minimal() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"message": {"content": "hello"}}"#).unwrap();
        assert_eq!(resp.message.content, "hello");
        assert!(resp.model.is_none());
        assert!(resp.eval_count.is_none());
    }

    // ── Wire behavior against a stub server ──────────────

    #[tokio::test]
    async fn test_post_success_returns_raw_response() {
        let (address, server) =
            stub_server(http_response("200 OK", r#"{"message":{"content":"hello"}}"#)).await;
        let client = client_for(&address);

        let response = client.post(&hi_request()).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"]["content"], "hello");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/chat HTTP/1.1"));
        let lower = raw.to_lowercase();
        assert!(lower.contains("accept: application/json"));
        assert!(lower.contains("content-type: application/json"));

        let (_, sent_body) = raw.split_once("\r\n\r\n").unwrap();
        let sent: serde_json::Value = serde_json::from_str(sent_body).unwrap();
        assert_eq!(
            sent,
            json!({
                "model": "phi3.5",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": false,
                "options": {"temperature": 0.7}
            })
        );
    }

    #[tokio::test]
    async fn test_reply_extracts_content() {
        let (address, _server) =
            stub_server(http_response("200 OK", r#"{"message":{"content":"hello"}}"#)).await;
        let text = client_for(&address).reply(&hi_request()).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_post_server_error_is_http_status() {
        let (address, _server) = stub_server(http_response(
            "500 Internal Server Error",
            r#"{"error":"model 'phi3.5' not found"}"#,
        ))
        .await;

        let err = client_for(&address).post(&hi_request()).await.unwrap_err();
        match err {
            LlmError::HttpStatus { status, url, body } => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(url, format!("http://{address}/api/chat"));
                assert!(body.contains("not found"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reply_undecodable_body() {
        let (address, _server) = stub_server(http_response("200 OK", "not json")).await;
        let err = client_for(&address).reply(&hi_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_post_timeout_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        // Accept, then never answer
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = client_for(&address).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = client.post(&hi_request()).await.unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        assert!(matches!(err, LlmError::Transport { ref url, .. } if url.ends_with("/api/chat")));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_post_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = client_for(&address).post(&hi_request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Transport { .. }));
        assert!(!err.is_timeout());
    }

    /// Compile-time check that the client can be shared across tasks.
    #[test]
    fn test_client_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<OllamaClient>();
    }
}

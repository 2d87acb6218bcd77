use reqwest::StatusCode;
use thiserror::Error;

/// A chat request that cannot be built. Never reaches the wire.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("temperature {0} is outside [0.0, 1.0]")]
    TemperatureOutOfRange(f64),
    #[error("model name must not be empty")]
    EmptyModel,
    #[error("message {index} has an empty role")]
    EmptyRole { index: usize },
    #[error("malformed chat request: {0}")]
    Malformed(String),
}

/// Failures surfaced by the Ollama client.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The HTTP client itself could not be built (TLS backend, bad address).
    #[error("cannot build HTTP client: {0}")]
    Client(String),

    /// The request never reached the server, or no response came back in time.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("{url} returned {status}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    /// 2xx response whose body is not a chat response.
    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl LlmError {
    /// True when the transport gave up because the timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Transport { source, .. } if source.is_timeout())
    }

    /// HTTP status for `HttpStatus` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            LlmError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

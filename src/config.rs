use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::chat::Behavior;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Where the local inference server lives and how to reach it.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// `host:port` of the Ollama server, without scheme
    #[serde(default = "default_address")]
    pub address: String,
    /// Set to false for self-signed certs (dev servers)
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
    /// Per-request timeout; local CPU inference can be slow
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub behavior: Behavior,
}

fn default_address() -> String {
    "localhost:11434".to_string()
}

fn default_tls_verify() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_model() -> String {
    "phi3.5".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            tls_verify: default_tls_verify(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            behavior: Behavior::default(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Chat completion endpoint, e.g. `http://localhost:11434/api/chat`.
    ///
    /// `address` must be a bare `host[:port]`: a scheme, credentials, path,
    /// query or fragment is rejected. A single trailing slash is tolerated.
    pub fn chat_url(&self) -> Result<Url, String> {
        let base = Url::parse(&format!("http://{}", self.address))
            .map_err(|e| format!("invalid address {:?}: {e}", self.address))?;

        let bare = base.host_str().is_some_and(|h| !h.is_empty())
            && base.path() == "/"
            && base.username().is_empty()
            && base.password().is_none()
            && base.query().is_none()
            && base.fragment().is_none();
        if !bare {
            return Err(format!(
                "invalid address {:?}: expected host:port without scheme or path",
                self.address
            ));
        }

        base.join("api/chat")
            .map_err(|e| format!("invalid address {:?}: {e}", self.address))
    }
}

impl Config {
    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            info!("No configuration at {path}, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${OLLAMA_ADDRESS}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }
}

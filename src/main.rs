use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use junia_chat::{ChatSession, Config, OllamaClient};

fn print_help() {
    println!(
        "\
junia-chat v{}

Chat with a model served by a local Ollama instance.

USAGE:
    junia-chat [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/chat.toml]
                   Built-in defaults are used when the file does not exist.

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG    Log level filter for tracing
                (e.g. debug, junia_chat=debug,warn)

EXAMPLES:
    junia-chat                        # uses config/chat.toml
    junia-chat ~/.config/junia.toml   # custom config path
    RUST_LOG=debug junia-chat         # with debug logging

Type /help inside the chat for session commands.",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("junia-chat v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ if config_path.is_none() => config_path = Some(arg),
            _ => {}
        }
    }
    let config_path = config_path.unwrap_or_else(|| "config/chat.toml".to_string());

    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("junia_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)
        .with_context(|| format!("cannot load configuration from {config_path}"))?;

    info!("Ollama server: {}", config.server.address);
    info!(
        "Model: {} ({}, temperature {})",
        config.chat.model,
        config.chat.behavior,
        config.chat.behavior.temperature()
    );

    // One client for the whole process, handed to the session
    let client = OllamaClient::new(&config.server)?;
    let mut session = ChatSession::new(client, config.chat.model, config.chat.behavior);

    println!("junia-chat v{} — type /help for commands", env!("CARGO_PKG_VERSION"));

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = session.run(stdin, stdout) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
        }
    }

    Ok(())
}

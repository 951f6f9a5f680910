use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use airouter_core::{ResponseEnvelope, RouteInput, RouteOptions, RouterError, StdoutSink, classify};

mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "airouter")]
#[command(version)]
#[command(about = "Route prompts to the best-suited LLM provider")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a single prompt
    Ask {
        /// The prompt to send
        prompt: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Route a JSON conversation read from a file, or stdin with `-`
    Chat {
        /// Path to a JSON array of {role, content} messages or a JSON string
        input: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the category a prompt would be routed by
    Classify {
        /// The text to classify
        text: String,
    },

    /// Show current configuration
    Config,

    /// Initialize config directory and default config
    Init,
}

#[derive(clap::Args, Clone, Copy)]
struct OutputArgs {
    /// Print tokens as they arrive
    #[arg(long)]
    stream: bool,

    /// Print the full response envelope as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Classify { text } => cmd_classify(&text),
        Commands::Ask { prompt, output } => {
            cmd_route(&cli.config, RouteInput::from(prompt), output).await
        }
        Commands::Chat { input, output } => {
            let conversation = read_conversation(&input).await?;
            cmd_route(&cli.config, conversation, output).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("airouter initialized at {}", config_dir.display());
    println!(
        "Set GEMINI_API_KEY and OPEN_ROUTER_API_KEY, or edit {}.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path)?;
    println!("{:#?}", cfg);
    Ok(())
}

fn cmd_classify(text: &str) -> Result<()> {
    println!("{}", classify(text));
    Ok(())
}

async fn read_conversation(input: &str) -> Result<RouteInput> {
    let raw = if input == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read conversation from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read conversation from {}", input))?
    };

    serde_json::from_str(&raw).context(
        "Conversation must be a JSON string or an array of {\"role\", \"content\"} objects",
    )
}

async fn cmd_route(
    config_path: &Option<PathBuf>,
    input: RouteInput,
    output: OutputArgs,
) -> Result<()> {
    let cfg = AppConfig::load(config_path)?;
    let router = cfg.build_router()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling request");
            ctrl_c.cancel();
        }
    });

    let streaming = output.stream && !output.json;
    let options = RouteOptions {
        sink: streaming.then(|| Arc::new(StdoutSink::new()) as Arc<dyn airouter_core::TokenSink>),
        cancel: Some(cancel),
    };

    let envelope = match router.route_with(input, options).await {
        Ok(envelope) => envelope,
        Err(RouterError::Cancelled) => anyhow::bail!("Request cancelled"),
        Err(e) => return Err(e.into()),
    };

    print_envelope(&envelope, output, streaming)?;

    if let ResponseEnvelope::Error { message, error } = &envelope {
        anyhow::bail!("{message} ({error})");
    }
    Ok(())
}

fn print_envelope(envelope: &ResponseEnvelope, output: OutputArgs, streamed: bool) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
        return Ok(());
    }

    match envelope {
        ResponseEnvelope::Error { .. } => {}
        // Successful text was already written token by token, labeled per provider
        ResponseEnvelope::Dual { responses } if streamed => {
            println!();
            for (provider, outcome) in responses.iter().filter(|(_, o)| !o.is_ok()) {
                println!("[{provider}] {}", outcome.display_text());
            }
        }
        _ if streamed => println!(),
        _ => println!("{}", envelope.text()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask_flags() {
        let cli = Cli::parse_from(["airouter", "--debug", "ask", "hello", "--stream"]);
        assert!(cli.debug);
        match cli.command {
            Commands::Ask { prompt, output } => {
                assert_eq!(prompt, "hello");
                assert!(output.stream);
                assert!(!output.json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[tokio::test]
    async fn test_read_conversation_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"},{"role":"user","content":"write code"}]"#,
        )
        .unwrap();

        let input = read_conversation(path.to_str().unwrap()).await.unwrap();
        match input {
            RouteInput::Messages(messages) => assert_eq!(messages.len(), 3),
            RouteInput::Prompt(_) => panic!("expected messages"),
        }
    }

    #[tokio::test]
    async fn test_read_conversation_bare_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.json");
        std::fs::write(&path, r#""Salam""#).unwrap();

        let input = read_conversation(path.to_str().unwrap()).await.unwrap();
        assert!(matches!(input, RouteInput::Prompt(p) if p == "Salam"));
    }

    #[tokio::test]
    async fn test_read_conversation_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(read_conversation(path.to_str().unwrap()).await.is_err());
    }
}

//! CLI entry point for agent-pubsub

use agent_pubsub_agent::{AgentSession, ConsoleRenderer, LineReader, StdinLineReader};
use agent_pubsub_core::bus::{ChannelRegistry, InputDisposition, MessageKind, SubscriberSession};
use agent_pubsub_core::config::validate::validate_config;
use agent_pubsub_core::config::{Config, ConfigLoader};
use agent_pubsub_core::logging::init_logging;
use agent_pubsub_core::utils::channel_id_for;
use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prompt used when the user (or every subscriber) supplies nothing
const DEFAULT_PROMPT: &str = "continue";

#[derive(Parser)]
#[command(name = "agent-pubsub")]
#[command(about = "Watch and steer an agent session over a pub/sub channel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive echo agent session
    Chat {
        /// Session name; the channel id is derived from it
        #[arg(short, long, default_value = "default")]
        session: String,
        /// Enable pub/sub for this run regardless of configuration
        #[arg(long)]
        pubsub: bool,
        /// Disable console rendering (requires pub/sub)
        #[arg(long)]
        no_console: bool,
        /// Attach a subscriber that mirrors envelopes to stderr and answers
        /// input requests from the terminal
        #[arg(short, long)]
        mirror: bool,
        /// Remote input timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Stop after this many turns
        #[arg(long)]
        max_turns: Option<u32>,
    },
    /// Show status information
    Status,
}

/// Grace period for blocking work (a stdin read) left behind at exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(Cli::parse()));
    // Stdin reads cannot be cancelled; do not wait for one at exit.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let mut config = config_loader.load()?;

    match cli.command {
        Commands::Chat {
            session,
            pubsub,
            no_console,
            mirror,
            timeout,
            max_turns,
        } => {
            config.pubsub.enabled |= pubsub || mirror;
            if no_console {
                config.pubsub.console_enabled = false;
            }
            if let Some(secs) = timeout {
                config.pubsub.input_timeout_secs = secs;
            }
            validate_config(&config)?;

            let _guard = init_logging(&config.logging);
            info!("Starting chat session: {}", session);
            run_chat(&config, &session, mirror, max_turns).await?;
        }
        Commands::Status => {
            run_status(&config_loader, &config);
        }
    }

    Ok(())
}

async fn run_chat(config: &Config, name: &str, mirror: bool, max_turns: Option<u32>) -> Result<()> {
    let registry = Arc::new(ChannelRegistry::new(&config.pubsub));
    let reader: Arc<dyn LineReader> = Arc::new(StdinLineReader::new());
    let session = AgentSession::new(
        name,
        &config.pubsub,
        Arc::clone(&registry),
        Arc::new(ConsoleRenderer::new(Some(name.to_string()))),
        Arc::clone(&reader),
    );

    let mirror_task = if mirror {
        let subscriber = registry.attach(session.channel_id(), Some(0))?;
        Some(tokio::spawn(run_mirror(subscriber, reader)))
    } else {
        if session.input().is_remote() {
            println!(
                "{}",
                style(format!(
                    "Waiting for input on channel '{}'; unanswered turns use '{}'",
                    session.channel_id(),
                    DEFAULT_PROMPT
                ))
                .dim()
            );
        }
        None
    };

    let result = echo_loop(&session, max_turns).await;

    session.end();
    let closed = registry.close_all();
    debug!(closed, "Registry drained");
    if let Some(task) = mirror_task {
        if let Err(e) = task.await {
            warn!("Mirror task failed: {}", e);
        }
    }

    result
}

/// Minimal agent: echoes every turn through a pretend tool call
async fn echo_loop(session: &AgentSession, max_turns: Option<u32>) -> Result<()> {
    let display = session.display();
    let mut turn: u32 = 0;

    loop {
        if max_turns.is_some_and(|max| turn >= max) {
            info!(turns = turn, "Turn limit reached");
            break;
        }

        let line = match session.request_input(DEFAULT_PROMPT).await {
            Ok(line) => line,
            Err(agent_pubsub_core::Error::Io(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                info!("Input closed, ending session");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        turn += 1;
        display.show_user_message(line, Some("echo".to_string()), turn);
        display.show_tool_call("echo", json!({ "text": line }));
        display.show_tool_result(Some("echo".to_string()), json!(line), false);
        display.show_assistant_message(format!("You said: {}", line), Some("echo".to_string()));
    }

    Ok(())
}

/// Print every envelope as a JSON line on stderr and answer input requests
/// from the terminal
async fn run_mirror(mut subscriber: SubscriberSession, reader: Arc<dyn LineReader>) {
    while let Some(envelope) = subscriber.recv().await {
        match envelope.to_json() {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Failed to encode envelope: {}", e),
        }

        if envelope.kind != MessageKind::InputRequest {
            continue;
        }
        let default_prompt = envelope.payload["default_prompt"]
            .as_str()
            .unwrap_or(DEFAULT_PROMPT)
            .to_string();
        let Some(channel) = subscriber.channel() else {
            break;
        };
        let read = tokio::select! {
            read = reader.read_line(&default_prompt) => read,
            _ = channel.closed() => {
                debug!("Channel closed while waiting for terminal input");
                break;
            }
        };
        match read {
            Ok(Some(line)) => match subscriber.submit_input(line) {
                Ok(InputDisposition::Accepted) => {}
                Ok(InputDisposition::Discarded) => {
                    println!("{}", style("Input arrived too late and was discarded").yellow());
                }
                Err(e) => {
                    warn!("Failed to submit input: {}", e);
                    break;
                }
            },
            Ok(None) => {
                // Terminal closed; ask the agent to stop.
                if let Err(e) = subscriber.submit_input("exit") {
                    debug!("Exit not submitted: {}", e);
                }
                break;
            }
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        }
    }
    debug!(
        session = %subscriber.session_id(),
        dropped = subscriber.dropped(),
        "Mirror detached"
    );
}

fn run_status(loader: &ConfigLoader, config: &Config) {
    println!("{}", style("Agent PubSub Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    println!();

    let pubsub = &config.pubsub;
    println!("{}", style("Pub/Sub:").bold());
    println!(
        "  Enabled: {}",
        if pubsub.enabled {
            style("yes").green()
        } else {
            style("no").dim()
        }
    );
    println!("  Console output: {}", pubsub.console_enabled);
    println!("  History capacity: {}", pubsub.history_capacity);
    println!("  Queue capacity: {}", pubsub.queue_capacity);
    println!("  Input timeout: {}s", pubsub.input_timeout_secs);
    println!("  Default channel: {}", channel_id_for("default"));
    println!();

    println!("{}", style("Logging:").bold());
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);
    println!("  Directory: {}", config.logging.dir);
}

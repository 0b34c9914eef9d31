#![forbid(unsafe_code)]

//! Line-oriented REPL over a streaming agent session.
//!
//! Bootstraps configuration and logging, starts one [`StreamSession`],
//! and forwards stdin lines as turns: streamed answer text goes to
//! stdout, tool-call records into the transcript, errors to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_conduit::config::GlobalConfig;
use agent_conduit::prompt::build_chat_prompt;
use agent_conduit::stream::{ConfigResolver, SessionOptions, StreamSession, TurnEvent};
use agent_conduit::transcript::{ChatMessage, ChatRole, ToolTracker, Transcript};
use agent_conduit::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-conduit", about = "Streaming chat over a CLI coding agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured working directory for the agent.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-conduit bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(workspace) = args.workspace {
        config.agent.working_directory = Some(workspace);
        config.validate()?;
    }
    debug!(?config, "configuration resolved");

    let resolver = Arc::new(ConfigResolver::new(config.agent.clone()));
    let session = StreamSession::spawn(
        resolver,
        SessionOptions::from_idle_seconds(config.timeouts.idle_seconds),
    );

    let mut transcript = Transcript::new();
    let mut tracker = ToolTracker::new(config.chat.compact_tool_calls);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = input.next_line().await? {
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        let prompt = build_chat_prompt(
            transcript.messages(),
            raw,
            config.chat.max_history_messages,
        );
        transcript.push(ChatMessage::dialogue(ChatRole::User, raw));

        let mut events = session.send(prompt).await;
        let mut assistant_started = false;
        let mut answer = String::new();

        while let Some(turn_event) = events.recv().await {
            match turn_event {
                TurnEvent::Chunk { delta, full_text } => {
                    if !assistant_started && !full_text.is_empty() {
                        transcript.push(ChatMessage::dialogue(ChatRole::Assistant, ""));
                        assistant_started = true;
                    }
                    if assistant_started {
                        transcript.update_last_assistant_text(&full_text);
                    }
                    answer = full_text;
                    stdout.write_all(delta.as_bytes()).await?;
                    stdout.flush().await?;
                }
                TurnEvent::ToolUse(block) => {
                    tracker.on_tool_use(&mut transcript, &block);
                }
                TurnEvent::ToolResult(block) => {
                    tracker.on_tool_result(&mut transcript, &block);
                }
                TurnEvent::Failed(message) => {
                    eprintln!("error: {message}");
                    transcript.push(ChatMessage::dialogue(ChatRole::Error, message));
                }
                TurnEvent::Done => break,
            }
        }

        if !answer.is_empty() {
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, shutting down");
    session.dispose().await;
    Ok(())
}

/// Configure the global tracing subscriber.
fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agent_conduit=info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}

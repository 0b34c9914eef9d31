//! Stream session actor: one persistent agent process, multiplexed turns.
//!
//! A [`StreamSession`] owns a background actor task that holds the only
//! handle to the agent process, its stdin, and the framed NDJSON view of
//! its stdout. Callers interact through commands; all turn results arrive
//! later as [`TurnEvent`]s on the per-turn channel returned by
//! [`send`](StreamSession::send). Dispatch is single-threaded inside the
//! actor, so the turn registry is never mutated concurrently.
//!
//! Lifecycle: the process is started lazily on the first `send` and reused
//! across turns until it exits, errors, times out, or the session is
//! stopped or disposed. After any of those, the next `send` respawns it
//! via the injected [`SpawnResolver`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::stream::codec::NdjsonCodec;
use crate::stream::event::{self, ContentBlock, StreamEvent, ToolResultBlock, ToolUseBlock};
use crate::stream::spawner::{self, SpawnResolver};
use crate::{AppError, Result};

/// Idle thresholds below this floor disable the inactivity timer.
const MIN_IDLE_SECONDS: u64 = 5;

/// Capacity of each per-turn event channel.
const TURN_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the session command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Grace period for collecting the exit status after stdout EOF.
const EXIT_WAIT: Duration = Duration::from_secs(5);

/// Events delivered on a turn's channel, in arrival order.
///
/// Every turn ends with exactly one [`Done`](Self::Done); every error path
/// delivers exactly one [`Failed`](Self::Failed) immediately before it.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A streamed text delta plus the turn's accumulated text so far.
    ///
    /// A final chunk with an empty `delta` is emitted when the turn's
    /// terminal `result` event arrives, so consumers can flush rendering.
    Chunk {
        /// The newly arrived text fragment.
        delta: String,
        /// Full text accumulated for this turn, including `delta`.
        full_text: String,
    },
    /// The agent invoked a tool.
    ToolUse(ToolUseBlock),
    /// A tool produced a result.
    ToolResult(ToolResultBlock),
    /// The turn failed; `Done` follows immediately.
    Failed(String),
    /// The turn is complete; no further events will arrive.
    Done,
}

/// Tunable session behavior.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Inactivity threshold for in-flight turns; `None` disables the timer.
    pub idle_timeout: Option<Duration>,
}

impl SessionOptions {
    /// Build options from a configured idle threshold in seconds, applying
    /// the [`MIN_IDLE_SECONDS`] floor below which the timer is disabled.
    #[must_use]
    pub fn from_idle_seconds(seconds: u64) -> Self {
        Self {
            idle_timeout: (seconds >= MIN_IDLE_SECONDS)
                .then_some(Duration::from_secs(seconds)),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_idle_seconds(45)
    }
}

/// Commands accepted by the session actor.
enum Command {
    /// Start a turn: write the prompt and register its event channel.
    Send {
        prompt: String,
        events: mpsc::Sender<TurnEvent>,
    },
    /// Cancel in-flight turns (completing them without error) and kill the
    /// process. The session stays usable; the next `send` respawns.
    Stop,
    /// Kill the process and drop all turn channels without emitting events.
    Dispose,
}

/// Handle to a running stream session actor.
///
/// Cloneable; dropping the last handle closes the command channel, which
/// makes the actor dispose itself (process killed, turns dropped).
#[derive(Clone)]
pub struct StreamSession {
    cmd_tx: mpsc::Sender<Command>,
}

impl StreamSession {
    /// Start the session actor. No process is spawned until the first
    /// [`send`](Self::send).
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(resolver: Arc<dyn SpawnResolver>, options: SessionOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let actor = SessionActor {
            resolver,
            idle_timeout: options.idle_timeout,
            cmd_rx,
            agent: None,
            turns: HashMap::new(),
            next_turn_id: 0,
            idle_deadline: None,
        };
        tokio::spawn(actor.run().instrument(info_span!("stream_session")));
        Self { cmd_tx }
    }

    /// Start one turn: ensure a live process, write the newline-terminated
    /// user-turn object to its stdin, and return the channel on which this
    /// turn's events arrive.
    ///
    /// Never blocks on the agent. Failures, including startup failures,
    /// are reported on the returned channel as `Failed` followed by `Done`.
    pub async fn send(&self, prompt: impl Into<String>) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(TURN_CHANNEL_CAPACITY);
        let command = Command::Send {
            prompt: prompt.into(),
            events: tx.clone(),
        };
        if self.cmd_tx.send(command).await.is_err() {
            // Actor already gone; fail the turn from here.
            let _ = tx.try_send(TurnEvent::Failed("session is disposed".to_owned()));
            let _ = tx.try_send(TurnEvent::Done);
        }
        rx
    }

    /// Cancel the in-flight turn locally and reset the whole session.
    ///
    /// In-flight turns complete with `Done` (no error), the inactivity
    /// timer stops, and the process is killed. There is no per-request
    /// cancellation that leaves the process alive.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
    }

    /// Explicit shutdown: best-effort process termination, turn channels
    /// dropped without any callback events.
    pub async fn dispose(&self) {
        let _ = self.cmd_tx.send(Command::Dispose).await;
    }
}

/// One in-flight turn.
struct Turn {
    full_text: String,
    events: mpsc::Sender<TurnEvent>,
}

/// Live agent process owned by the actor.
struct AgentProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: FramedRead<ChildStdout, NdjsonCodec>,
}

/// What the actor loop observed in one iteration.
enum Step {
    Command(Option<Command>),
    Line(Option<Result<String>>),
    IdleTimeout,
}

/// The session actor: exclusive owner of the process handle, the framed
/// stdout, and the turn registry.
struct SessionActor {
    resolver: Arc<dyn SpawnResolver>,
    idle_timeout: Option<Duration>,
    cmd_rx: mpsc::Receiver<Command>,
    agent: Option<AgentProcess>,
    turns: HashMap<u64, Turn>,
    next_turn_id: u64,
    idle_deadline: Option<Instant>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let step = match self.agent.as_mut() {
                Some(agent) => tokio::select! {
                    biased;

                    cmd = self.cmd_rx.recv() => Step::Command(cmd),
                    line = agent.stdout.next() => Step::Line(line),
                    () = idle_wait(self.idle_deadline) => Step::IdleTimeout,
                },
                None => Step::Command(self.cmd_rx.recv().await),
            };

            match step {
                Step::Command(Some(Command::Send { prompt, events })) => {
                    self.handle_send(prompt, events).await;
                }
                Step::Command(Some(Command::Stop)) => self.handle_stop().await,
                Step::Command(Some(Command::Dispose)) | Step::Command(None) => {
                    self.handle_dispose().await;
                    break;
                }
                Step::Line(Some(Ok(line))) => self.handle_line(&line).await,
                Step::Line(Some(Err(err))) => self.handle_stream_error(err).await,
                Step::Line(None) => self.handle_process_exit().await,
                Step::IdleTimeout => self.handle_idle_timeout().await,
            }
        }
        debug!("stream session actor stopped");
    }

    /// Ensure a live process, write the outbound turn, register the turn.
    async fn handle_send(&mut self, prompt: String, events: mpsc::Sender<TurnEvent>) {
        if self.agent.is_none() {
            if let Err(err) = self.start_process() {
                fail_turn(&events, format!("failed to start agent process: {err}")).await;
                return;
            }
        }
        let Some(agent) = self.agent.as_mut() else {
            fail_turn(&events, "agent process is not available".to_owned()).await;
            return;
        };

        let mut line = event::user_turn(&prompt).to_string();
        line.push('\n');
        let written = async {
            agent.stdin.write_all(line.as_bytes()).await?;
            agent.stdin.flush().await
        }
        .await;
        if let Err(err) = written {
            // A broken stdin fails only this turn; the process is torn down
            // on its own exit path, not here.
            warn!(%err, "write to agent stdin failed");
            fail_turn(&events, format!("failed to write to agent: {err}")).await;
            return;
        }

        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;
        self.turns.insert(
            turn_id,
            Turn {
                full_text: String::new(),
                events,
            },
        );
        self.arm_idle_timer();
        debug!(turn_id, "turn registered");
    }

    /// Resolve a spawn config and start the agent process.
    fn start_process(&mut self) -> Result<()> {
        let config = self.resolver.resolve()?;
        let mut handles = spawner::spawn_agent(&config)?;
        info!(command = %config.command, "agent process started");
        if let Some(stderr) = handles.child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }
        self.agent = Some(AgentProcess {
            child: handles.child,
            stdin: handles.stdin,
            stdout: FramedRead::new(handles.stdout, NdjsonCodec::new()),
        });
        Ok(())
    }

    /// Decode and dispatch one stdout line.
    async fn handle_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match event::parse_event(trimmed) {
            Ok(stream_event) => self.dispatch(stream_event).await,
            Err(err) => {
                // Protocol mismatch, not a transient issue: fail every
                // registered turn. The process is left to its own exit path.
                warn!(%err, raw_line = trimmed, "agent emitted non-JSON output");
                self.fail_all("agent emitted non-JSON output; check agent CLI flags".to_owned())
                    .await;
            }
        }
    }

    /// Route a decoded event to the registered turns, in emission order.
    async fn dispatch(&mut self, stream_event: StreamEvent) {
        match stream_event {
            StreamEvent::Assistant { message } => {
                for block in message.content {
                    match block {
                        ContentBlock::Text { text } => {
                            if text.is_empty() {
                                continue;
                            }
                            self.broadcast_text(&text).await;
                            self.arm_idle_timer();
                        }
                        ContentBlock::ToolUse(block) => {
                            self.broadcast(TurnEvent::ToolUse(block)).await;
                            self.arm_idle_timer();
                        }
                        ContentBlock::ToolResult(block) => {
                            self.broadcast(TurnEvent::ToolResult(block)).await;
                            self.arm_idle_timer();
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            StreamEvent::Result => self.complete_all().await,
            StreamEvent::Other => debug!("skipping unhandled stream event tag"),
        }
    }

    /// Append a text delta to every turn and emit its chunk event.
    async fn broadcast_text(&mut self, delta: &str) {
        let mut dead = Vec::new();
        for (id, turn) in &mut self.turns {
            turn.full_text.push_str(delta);
            let chunk = TurnEvent::Chunk {
                delta: delta.to_owned(),
                full_text: turn.full_text.clone(),
            };
            if turn.events.send(chunk).await.is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.turns.remove(&id);
        }
    }

    /// Emit one event to every turn, dropping turns whose consumer is gone.
    async fn broadcast(&mut self, turn_event: TurnEvent) {
        let mut dead = Vec::new();
        for (id, turn) in &self.turns {
            if turn.events.send(turn_event.clone()).await.is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.turns.remove(&id);
        }
    }

    /// Terminal `result` event: flush, complete, and deregister every turn.
    async fn complete_all(&mut self) {
        for (_, turn) in self.turns.drain() {
            let flush = TurnEvent::Chunk {
                delta: String::new(),
                full_text: turn.full_text.clone(),
            };
            let _ = turn.events.send(flush).await;
            let _ = turn.events.send(TurnEvent::Done).await;
        }
        self.idle_deadline = None;
    }

    /// Fail and deregister every turn with the same message.
    async fn fail_all(&mut self, message: String) {
        for (_, turn) in self.turns.drain() {
            fail_turn(&turn.events, message.clone()).await;
        }
        self.idle_deadline = None;
    }

    /// Codec-level failure on the stdout stream.
    async fn handle_stream_error(&mut self, err: AppError) {
        match err {
            AppError::Stream(msg) => {
                // Framing violation (oversized line): protocol-level, the
                // process keeps running.
                warn!(error = %msg, "agent stream framing error");
                self.fail_all(format!("agent stream framing error: {msg}")).await;
            }
            other => {
                warn!(error = %other, "agent stream I/O error");
                self.teardown_process().await;
                self.fail_all(format!("agent stream error: {other}")).await;
            }
        }
    }

    /// Stdout EOF: collect the exit status, reset, fail registered turns.
    async fn handle_process_exit(&mut self) {
        let code = match self.agent.take() {
            Some(mut agent) => {
                match tokio::time::timeout(EXIT_WAIT, agent.child.wait()).await {
                    Ok(Ok(status)) => status.code(),
                    Ok(Err(err)) => {
                        warn!(%err, "error collecting agent exit status");
                        None
                    }
                    Err(_elapsed) => {
                        // Stdout closed but the process lingers; kill it.
                        agent.child.start_kill().ok();
                        None
                    }
                }
            }
            None => None,
        };
        let message = code.map_or_else(
            || "agent process exited".to_owned(),
            |c| format!("agent process exited with code {c}"),
        );
        info!(exit_code = ?code, "agent process exited");
        self.fail_all(message).await;
    }

    /// Inactivity timer fired: timeout error, whole-session reset.
    async fn handle_idle_timeout(&mut self) {
        let seconds = self.idle_timeout.map_or(0, |d| d.as_secs());
        warn!(idle_seconds = seconds, "agent turn timed out");
        self.teardown_process().await;
        self.fail_all(format!("agent timed out after {seconds}s of inactivity"))
            .await;
    }

    /// Local cancel: complete in-flight turns without error, reset session.
    async fn handle_stop(&mut self) {
        for (_, turn) in self.turns.drain() {
            let _ = turn.events.send(TurnEvent::Done).await;
        }
        self.idle_deadline = None;
        self.teardown_process().await;
    }

    /// Explicit shutdown: no events, best-effort kill.
    async fn handle_dispose(&mut self) {
        self.turns.clear();
        self.idle_deadline = None;
        self.teardown_process().await;
    }

    /// Kill and drop the process handle, logging termination failures.
    async fn teardown_process(&mut self) {
        if let Some(mut agent) = self.agent.take() {
            if let Err(err) = agent.child.kill().await {
                warn!(%err, "failed to kill agent process");
            }
        }
    }

    /// (Re)arm the inactivity deadline while turns are in flight.
    fn arm_idle_timer(&mut self) {
        if self.turns.is_empty() {
            self.idle_deadline = None;
            return;
        }
        self.idle_deadline = self.idle_timeout.map(|d| Instant::now() + d);
    }
}

/// Sleep until the idle deadline, or forever when no deadline is armed.
async fn idle_wait(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Deliver the `Failed` + `Done` pair for one turn.
async fn fail_turn(events: &mpsc::Sender<TurnEvent>, message: String) {
    let _ = events.send(TurnEvent::Failed(message)).await;
    let _ = events.send(TurnEvent::Done).await;
}

/// Forward agent stderr lines to the debug log.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "agent_stderr", "{line}");
    }
}

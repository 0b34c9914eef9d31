//! Agent stream handling.
//!
//! This module manages bidirectional NDJSON stream communication with the
//! headless agent process. One [`StreamSession`](session::StreamSession)
//! owns at most one live process at a time, reused across turns.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based stream framing for NDJSON lines.
//! - `event`: tagged-union decoding of assistant/result events and their
//!   content blocks.
//! - `spawner`: process spawning and the call-by-call spawn-config resolver.
//! - `session`: the session actor multiplexing turns over the process.

pub mod codec;
pub mod event;
pub mod session;
pub mod spawner;

pub use event::{ContentBlock, StreamEvent, ToolResultBlock, ToolUseBlock};
pub use session::{SessionOptions, StreamSession, TurnEvent};
pub use spawner::{ConfigResolver, SpawnConfig, SpawnResolver};

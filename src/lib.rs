#![forbid(unsafe_code)]

//! `agent-conduit`: streaming chat sessions over a headless CLI coding
//! agent's stdio.
//!
//! The crate owns three pieces:
//! - [`stream`]: a persistent-process session that frames the agent's
//!   stdout as newline-delimited JSON and multiplexes turns over it.
//! - [`transcript`]: the conversation model and the tool-call lifecycle
//!   tracker that reduces stream events into addressable records.
//! - [`prompt`]: the pure history-window prompt assembly policy.

pub mod config;
pub mod errors;
pub mod prompt;
pub mod stream;
pub mod transcript;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

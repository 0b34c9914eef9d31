//! Conversation transcript model and the tool-call lifecycle reducer.
//!
//! Submodules:
//! - `tracker`: reduces tool stream events into addressable records.
//! - `summary`: compact-mode aggregation over tool-call records.

pub mod summary;
pub mod tracker;

pub use summary::ToolSummary;
pub use tracker::ToolTracker;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Author role of one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// User-authored dialogue.
    User,
    /// Agent-authored dialogue.
    Assistant,
    /// Tool-call record (invocation, result, or compact summary).
    Tool,
    /// Locally generated system notice.
    System,
    /// Error surfaced from a failed turn.
    Error,
}

/// Lifecycle state of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Invocation observed; no result yet.
    Running,
    /// Result observed without an error signal.
    Done,
    /// Result signalled an error.
    Error,
}

/// Tracked state for one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMeta {
    /// Stable tool-call identifier (correlates invocation and result).
    pub tool_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Human-readable title, when one could be derived.
    pub title: Option<String>,
    /// Current lifecycle state.
    pub status: ToolStatus,
    /// Shell command extracted from the invocation input, if any.
    pub command: Option<String>,
    /// File path extracted from the invocation input, if any.
    pub path: Option<String>,
    /// Exit code attached by the result, if any.
    pub exit_code: Option<i64>,
}

/// Metadata attached to non-plain transcript messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMeta {
    /// A tool-call record; its lifecycle lives in [`ToolMeta::status`].
    Tool(ToolMeta),
    /// The single compact-mode aggregate record.
    ToolSummary,
    /// Injected context (file contents, selection), not dialogue.
    Context,
    /// Sample/demo content, not dialogue.
    Sample,
}

/// One unit of conversational or tool-execution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: String,
    /// Author role.
    pub role: ChatRole,
    /// Message text (for tool records, the derived description).
    pub text: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Optional metadata; `None` for plain dialogue.
    pub meta: Option<MessageMeta>,
}

impl ChatMessage {
    /// Create a plain dialogue message with a fresh id.
    #[must_use]
    pub fn dialogue(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            meta: None,
        }
    }

    /// Whether this message is dialogue eligible for prompt history:
    /// user- or agent-authored, and not flagged as context, sample, or
    /// summary material.
    #[must_use]
    pub fn is_dialogue(&self) -> bool {
        let dialogue_role = matches!(self.role, ChatRole::User | ChatRole::Assistant);
        let contextual = matches!(
            self.meta,
            Some(MessageMeta::Context | MessageMeta::Sample | MessageMeta::ToolSummary)
        );
        dialogue_role && !contextual
    }

    /// Whether this message is an individual tool-call record.
    #[must_use]
    pub fn is_tool_record(&self) -> bool {
        matches!(self.meta, Some(MessageMeta::Tool(_)))
    }
}

/// Ordered conversation history with positional insertion rules for tool
/// records.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in chronological order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message at the end.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Remove all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Replace the text of the most recent non-context assistant message,
    /// used while a turn's answer is still streaming.
    pub fn update_last_assistant_text(&mut self, text: &str) {
        if let Some(index) = self.last_assistant_index() {
            if let Some(message) = self.messages.get_mut(index) {
                message.text = text.to_owned();
            }
        }
    }

    /// Index of the most recent assistant message that is not injected
    /// context.
    #[must_use]
    pub fn last_assistant_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| {
            m.role == ChatRole::Assistant && !matches!(m.meta, Some(MessageMeta::Context))
        })
    }

    /// Insert a tool record in its conversational position: immediately
    /// after the most recent non-context assistant message and after any
    /// tool records already clustered there, so records keep arrival
    /// order. Falls back to the end when no assistant message exists.
    pub fn insert_tool_record(&mut self, message: ChatMessage) {
        let index = self.tool_cluster_end();
        self.messages.insert(index, message);
    }

    /// One past the end of the tool-record cluster attached to the last
    /// non-context assistant message.
    fn tool_cluster_end(&self) -> usize {
        let Some(anchor) = self.last_assistant_index() else {
            return self.messages.len();
        };
        let mut index = anchor + 1;
        while index < self.messages.len() && self.messages[index].is_tool_record() {
            index += 1;
        }
        index
    }

    /// Find the position of the `running` tool record with the given id.
    #[must_use]
    pub fn find_running_tool(&self, tool_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| {
            matches!(
                &m.meta,
                Some(MessageMeta::Tool(meta))
                    if meta.tool_id == tool_id && meta.status == ToolStatus::Running
            )
        })
    }

    /// Find the position of the compact-mode summary record, if present.
    #[must_use]
    pub fn find_summary(&self) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| matches!(m.meta, Some(MessageMeta::ToolSummary)))
    }

    /// Mutable access to a message by position.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ChatMessage> {
        self.messages.get_mut(index)
    }

    /// Remove a message by position.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of bounds, like [`Vec::remove`].
    pub fn remove(&mut self, index: usize) -> ChatMessage {
        self.messages.remove(index)
    }
}

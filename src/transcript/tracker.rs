//! Tool-call lifecycle reducer.
//!
//! Consumes the session's tool events and maintains the transcript's
//! tool-call records: a `tool_use` block opens a record in `running`
//! state, positioned with the conversation's most recent assistant
//! message; a `tool_result` block transitions the matching record in
//! place, or creates a standalone resolved record when no invocation was
//! observed for its id. When compact mode is on, the tracker additionally
//! maintains the single aggregate record.

use chrono::Utc;
use tracing::debug;

use crate::stream::event::{ToolResultBlock, ToolUseBlock};
use crate::transcript::summary::ToolSummary;
use crate::transcript::{ChatMessage, ChatRole, MessageMeta, ToolMeta, ToolStatus, Transcript};

/// Reducer over tool stream events for one conversation.
#[derive(Debug, Default)]
pub struct ToolTracker {
    compact: bool,
    summary: Option<ToolSummary>,
}

impl ToolTracker {
    /// Create a tracker; `compact` selects aggregation mode.
    #[must_use]
    pub fn new(compact: bool) -> Self {
        Self {
            compact,
            summary: compact.then(ToolSummary::new),
        }
    }

    /// Whether compact aggregation mode is active.
    #[must_use]
    pub fn is_compact(&self) -> bool {
        self.compact
    }

    /// Current aggregate, when compact mode is active.
    #[must_use]
    pub fn summary(&self) -> Option<&ToolSummary> {
        self.summary.as_ref()
    }

    /// Toggle compact mode.
    ///
    /// Turning it on collapses the retained records into a freshly
    /// recomputed aggregate; turning it off removes the aggregate record,
    /// leaving the per-call records as the full view. Both directions are
    /// deterministic recomputations over the retained record set.
    pub fn set_compact(&mut self, compact: bool, transcript: &mut Transcript) {
        if self.compact == compact {
            return;
        }
        self.compact = compact;
        if compact {
            self.rebuild_summary(transcript);
        } else {
            if let Some(index) = transcript.find_summary() {
                transcript.remove(index);
            }
            self.summary = None;
        }
    }

    /// Recompute the aggregate from the transcript's retained records and
    /// refresh (or create) the summary record; a transcript without tool
    /// records gets no summary record. Idempotent: running this twice over
    /// the same records yields the same aggregate.
    pub fn rebuild_summary(&mut self, transcript: &mut Transcript) {
        let summary = ToolSummary::from_transcript(transcript);
        write_summary_record(transcript, &summary);
        self.summary = Some(summary);
    }

    /// Reduce a `tool_use` block: open a `running` record placed with the
    /// current assistant message.
    pub fn on_tool_use(&mut self, transcript: &mut Transcript, block: &ToolUseBlock) {
        let tool_id = block.stable_id();
        let tool_name = block.tool_name();
        debug!(tool_id, tool_name, "tool invocation observed");

        let meta = ToolMeta {
            tool_id: tool_id.clone(),
            tool_name: tool_name.clone(),
            title: block.derive_title(),
            status: ToolStatus::Running,
            command: block.command(),
            path: block.file_path(),
            exit_code: None,
        };
        transcript.insert_tool_record(ChatMessage {
            id: format!("tool-{tool_id}"),
            role: ChatRole::Tool,
            text: block.describe(),
            timestamp: Utc::now(),
            meta: Some(MessageMeta::Tool(meta)),
        });

        if self.compact {
            let summary = self.summary.get_or_insert_with(ToolSummary::new);
            summary.record_use(&tool_id, &tool_name);
            let snapshot = summary.clone();
            write_summary_record(transcript, &snapshot);
        }
    }

    /// Reduce a `tool_result` block: transition the matching `running`
    /// record in place, or create a standalone resolved record.
    pub fn on_tool_result(&mut self, transcript: &mut Transcript, block: &ToolResultBlock) {
        let tool_id = block
            .correlation_id()
            .unwrap_or_else(|| format!("tool-{}", Utc::now().timestamp_millis()));
        let status = if block.is_failure() {
            ToolStatus::Error
        } else {
            ToolStatus::Done
        };
        let text = block.describe();
        debug!(tool_id, ?status, "tool result observed");

        if let Some(index) = transcript.find_running_tool(&tool_id) {
            if let Some(message) = transcript.get_mut(index) {
                message.text = text;
                if let Some(MessageMeta::Tool(meta)) = &mut message.meta {
                    meta.status = status;
                    meta.exit_code = block.exit_code;
                }
            }
        } else {
            // No invocation was observed for this id; keep the result as
            // its own resolved record instead of discarding it.
            let meta = ToolMeta {
                tool_id: tool_id.clone(),
                tool_name: block.name.clone().unwrap_or_else(|| "Tool".to_owned()),
                title: None,
                status,
                command: None,
                path: None,
                exit_code: block.exit_code,
            };
            transcript.insert_tool_record(ChatMessage {
                id: format!("tool-result-{tool_id}"),
                role: ChatRole::Tool,
                text,
                timestamp: Utc::now(),
                meta: Some(MessageMeta::Tool(meta)),
            });
        }

        if self.compact {
            let summary = self.summary.get_or_insert_with(ToolSummary::new);
            if block.is_failure() {
                summary.record_error();
            }
            let snapshot = summary.clone();
            write_summary_record(transcript, &snapshot);
        }
    }
}

/// Create or refresh the transcript's single summary record from an
/// aggregate snapshot. An empty aggregate gets no record at all; a stale
/// record is removed instead.
fn write_summary_record(transcript: &mut Transcript, summary: &ToolSummary) {
    if summary.is_empty() {
        if let Some(index) = transcript.find_summary() {
            transcript.remove(index);
        }
        return;
    }
    if let Some(index) = transcript.find_summary() {
        if let Some(message) = transcript.get_mut(index) {
            message.text = summary.render();
        }
        return;
    }
    transcript.insert_tool_record(ChatMessage {
        id: format!("tool-summary-{}", Utc::now().timestamp_millis()),
        role: ChatRole::Tool,
        text: summary.render(),
        timestamp: Utc::now(),
        meta: Some(MessageMeta::ToolSummary),
    });
}

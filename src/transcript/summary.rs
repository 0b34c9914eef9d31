//! Compact-mode aggregation over tool-call records.
//!
//! When compact mode is enabled the tracker does not surface individual
//! tool records; it maintains one evolving aggregate instead. The
//! aggregate can be updated incrementally as events arrive or rebuilt
//! wholesale from retained records; both paths are idempotent over the
//! same underlying record set.

use std::collections::{BTreeMap, HashSet};

use crate::transcript::{MessageMeta, ToolMeta, ToolStatus, Transcript};

/// Running aggregate of tool activity for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSummary {
    /// Distinct tool invocations (counted once per unique id).
    pub total_calls: u32,
    /// Invocation counts per tool name.
    pub tool_counts: BTreeMap<String, u32>,
    /// Number of error results observed.
    pub error_count: u32,
    seen_ids: HashSet<String>,
}

impl ToolSummary {
    /// Create an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation. Duplicate `tool_use` events for an id
    /// already counted are ignored. Returns whether the counts changed.
    pub fn record_use(&mut self, tool_id: &str, tool_name: &str) -> bool {
        if !self.seen_ids.insert(tool_id.to_owned()) {
            return false;
        }
        self.total_calls += 1;
        *self.tool_counts.entry(tool_name.to_owned()).or_insert(0) += 1;
        true
    }

    /// Record one error result.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Whether the aggregate has recorded no invocations and no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_calls == 0 && self.error_count == 0
    }

    /// Rebuild an aggregate from the tool-call records retained in a
    /// transcript. Recomputing over an unchanged transcript yields
    /// identical counts.
    #[must_use]
    pub fn from_transcript(transcript: &Transcript) -> Self {
        let mut summary = Self::new();
        for message in transcript.messages() {
            let Some(MessageMeta::Tool(meta)) = &message.meta else {
                continue;
            };
            summary.record_use(&meta.tool_id, &meta.tool_name);
            if record_is_error(meta) {
                summary.record_error();
            }
        }
        summary
    }

    /// Render the aggregate as the summary record's display text, e.g.
    /// `**Tool calls:** 3 • Bash ×2, Read ×1 • **Errors:** 1`. Tool names
    /// are listed by descending count.
    #[must_use]
    pub fn render(&self) -> String {
        let mut entries: Vec<(&String, &u32)> = self.tool_counts.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1));
        let breakdown = entries
            .iter()
            .map(|(name, count)| format!("{name} \u{d7}{count}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut parts = vec![format!("**Tool calls:** {}", self.total_calls)];
        if !breakdown.is_empty() {
            parts.push(breakdown);
        }
        if self.error_count > 0 {
            parts.push(format!("**Errors:** {}", self.error_count));
        }
        parts.join(" \u{2022} ")
    }
}

/// Whether a retained record counts as an error: either an error status or
/// a non-zero exit code.
fn record_is_error(meta: &ToolMeta) -> bool {
    meta.status == ToolStatus::Error || meta.exit_code.is_some_and(|code| code != 0)
}

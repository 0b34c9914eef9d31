//! Unit tests for compact-mode tool aggregation.

use serde_json::json;

use agent_conduit::stream::{ToolResultBlock, ToolUseBlock};
use agent_conduit::transcript::{MessageMeta, ToolSummary, ToolTracker, Transcript};

fn tool_use(value: serde_json::Value) -> ToolUseBlock {
    serde_json::from_value(value).expect("tool_use block must deserialize")
}

fn tool_result(value: serde_json::Value) -> ToolResultBlock {
    serde_json::from_value(value).expect("tool_result block must deserialize")
}

fn populated_transcript() -> (Transcript, ToolTracker) {
    let mut transcript = Transcript::new();
    let mut tracker = ToolTracker::new(true);
    tracker.on_tool_use(
        &mut transcript,
        &tool_use(json!({ "id": "t1", "name": "Bash", "input": { "command": "ls" } })),
    );
    tracker.on_tool_use(
        &mut transcript,
        &tool_use(json!({ "id": "t2", "name": "Bash" })),
    );
    tracker.on_tool_use(
        &mut transcript,
        &tool_use(json!({ "id": "t3", "name": "Read" })),
    );
    tracker.on_tool_result(
        &mut transcript,
        &tool_result(json!({ "tool_use_id": "t2", "is_error": true })),
    );
    (transcript, tracker)
}

/// The incremental aggregate counts distinct invocations, per-tool
/// histogram entries, and error results.
#[test]
fn incremental_aggregate_counts() {
    let (_, tracker) = populated_transcript();
    let summary = tracker.summary().expect("compact mode keeps an aggregate");

    assert_eq!(summary.total_calls, 3);
    assert_eq!(summary.tool_counts.get("Bash"), Some(&2));
    assert_eq!(summary.tool_counts.get("Read"), Some(&1));
    assert_eq!(summary.error_count, 1);
}

/// Duplicate `tool_use` events for an id already counted are ignored.
#[test]
fn duplicate_tool_use_counts_once() {
    let mut summary = ToolSummary::new();
    assert!(summary.record_use("t1", "Bash"));
    assert!(!summary.record_use("t1", "Bash"));

    assert_eq!(summary.total_calls, 1);
    assert_eq!(summary.tool_counts.get("Bash"), Some(&1));
}

/// Recomputing the aggregate from an unchanged record set twice yields
/// identical counts.
#[test]
fn recomputation_is_idempotent() {
    let (transcript, _) = populated_transcript();

    let first = ToolSummary::from_transcript(&transcript);
    let second = ToolSummary::from_transcript(&transcript);

    assert_eq!(first, second);
    assert_eq!(first.total_calls, 3);
    assert_eq!(first.error_count, 1);
}

/// The transcript carries exactly one summary record in compact mode, and
/// its text reflects the evolving counts.
#[test]
fn single_summary_record_is_maintained() {
    let (transcript, _) = populated_transcript();

    let summaries = transcript
        .messages()
        .iter()
        .filter(|m| matches!(m.meta, Some(MessageMeta::ToolSummary)))
        .count();
    assert_eq!(summaries, 1);

    let index = transcript.find_summary().expect("summary record exists");
    let text = &transcript.messages()[index].text;
    assert!(text.contains("**Tool calls:** 3"), "got: {text}");
    assert!(text.contains("**Errors:** 1"), "got: {text}");
}

/// Toggling compact mode off removes the aggregate record; toggling it
/// back on rebuilds the same counts from the retained records.
#[test]
fn compact_toggle_round_trip() {
    let (mut transcript, mut tracker) = populated_transcript();

    tracker.set_compact(false, &mut transcript);
    assert!(transcript.find_summary().is_none());
    assert!(tracker.summary().is_none());

    tracker.set_compact(true, &mut transcript);
    let summary = tracker.summary().expect("aggregate rebuilt");
    assert_eq!(summary.total_calls, 3);
    assert_eq!(summary.tool_counts.get("Bash"), Some(&2));
    assert_eq!(summary.error_count, 1);
    assert!(transcript.find_summary().is_some());
}

/// Enabling compact mode over a transcript with no tool records writes no
/// summary record at all, rather than a zero-count one.
#[test]
fn empty_record_set_writes_no_summary() {
    let mut transcript = Transcript::new();
    let mut tracker = ToolTracker::new(false);

    tracker.set_compact(true, &mut transcript);

    assert!(transcript.find_summary().is_none());
    assert!(transcript.is_empty());

    // The first real invocation creates the record.
    tracker.on_tool_use(
        &mut transcript,
        &tool_use(json!({ "id": "t1", "name": "Bash" })),
    );
    assert!(transcript.find_summary().is_some());
}

/// Rendered text lists tools by descending count and omits the error part
/// when no errors occurred.
#[test]
fn render_formats_counts() {
    let mut summary = ToolSummary::new();
    summary.record_use("a", "Bash");
    summary.record_use("b", "Bash");
    summary.record_use("c", "Read");

    let text = summary.render();
    assert!(text.starts_with("**Tool calls:** 3"));
    let bash = text.find("Bash").expect("bash entry");
    let read = text.find("Read").expect("read entry");
    assert!(bash < read, "higher counts must come first: {text}");
    assert!(!text.contains("Errors"));
}

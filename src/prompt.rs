//! Prompt assembly: rolling history window to a bounded request string.

use crate::transcript::{ChatMessage, ChatRole};

/// Fixed instructional preamble emitted at the top of every prompt.
const PREAMBLE: &str = "You are an AI coding assistant.";

/// Build the request string for one turn from conversation history and the
/// latest user input.
///
/// Walks `history` from most recent backward, selecting only dialogue
/// messages (user- or agent-authored, excluding tool/system/error roles
/// and any message flagged as context, sample, or summary material) until
/// `max_history` are collected, then restores chronological order. The
/// output is the preamble, each selected message as a `Role: text` line
/// followed by a blank line, then `User: <latest_input>` and a trailing
/// `Assistant:` cue with no content, the hand-off point for the agent's
/// completion.
///
/// `latest_input` is appended exactly once and never duplicated from
/// history.
#[must_use]
pub fn build_chat_prompt(
    history: &[ChatMessage],
    latest_input: &str,
    max_history: usize,
) -> String {
    let mut recent: Vec<&ChatMessage> = Vec::new();
    for message in history.iter().rev() {
        if recent.len() >= max_history {
            break;
        }
        if message.is_dialogue() {
            recent.push(message);
        }
    }
    recent.reverse();

    let mut lines: Vec<String> = vec![PREAMBLE.to_owned(), String::new()];
    for message in recent {
        let label = if message.role == ChatRole::User {
            "User"
        } else {
            "Assistant"
        };
        lines.push(format!("{label}: {}", message.text));
        lines.push(String::new());
    }

    lines.push(format!("User: {latest_input}"));
    lines.push(String::new());
    lines.push("Assistant:".to_owned());

    lines.join("\n")
}

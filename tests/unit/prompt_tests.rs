//! Unit tests for prompt assembly and the history window.

use chrono::Utc;

use agent_conduit::prompt::build_chat_prompt;
use agent_conduit::transcript::{ChatMessage, ChatRole, MessageMeta, ToolMeta, ToolStatus};

fn dialogue(role: ChatRole, text: &str) -> ChatMessage {
    ChatMessage::dialogue(role, text)
}

fn base_history() -> Vec<ChatMessage> {
    vec![
        dialogue(ChatRole::User, "How are you?"),
        dialogue(ChatRole::Assistant, "Great!"),
    ]
}

/// The latest input appears exactly once, at the end.
#[test]
fn latest_input_appears_exactly_once() {
    let prompt = build_chat_prompt(&base_history(), "unique-user-input", 6);
    assert_eq!(prompt.matches("unique-user-input").count(), 1);
    assert!(prompt.ends_with("User: unique-user-input\n\nAssistant:"));
}

/// The history window keeps only the most recent dialogue messages.
#[test]
fn respects_max_history_limit() {
    let mut history = base_history();
    history.push(dialogue(ChatRole::User, "Tell me more"));
    history.push(dialogue(ChatRole::Assistant, "Sure thing"));

    let prompt = build_chat_prompt(&history, "latest-question", 2);

    assert!(prompt.contains("Assistant: Sure thing"));
    assert!(!prompt.contains("How are you?"));
}

/// At most N role-labelled history lines appear, for any history length.
#[test]
fn history_line_count_is_bounded() {
    let mut history = Vec::new();
    for i in 0..20 {
        history.push(dialogue(ChatRole::User, &format!("question {i}")));
        history.push(dialogue(ChatRole::Assistant, &format!("answer {i}")));
    }

    let prompt = build_chat_prompt(&history, "the-latest", 5);

    let history_lines = prompt
        .lines()
        .filter(|l| l.starts_with("User: ") || l.starts_with("Assistant: "))
        // The final `User: the-latest` line is not history.
        .filter(|l| *l != "User: the-latest")
        .count();
    assert_eq!(history_lines, 5);
}

/// Non-dialogue roles never appear, even when most recent.
#[test]
fn non_dialogue_roles_are_filtered() {
    let mut history = base_history();
    let mut tool = dialogue(ChatRole::Tool, "internal detail");
    tool.meta = Some(MessageMeta::Tool(ToolMeta {
        tool_id: "t1".to_owned(),
        tool_name: "Bash".to_owned(),
        title: None,
        status: ToolStatus::Done,
        command: None,
        path: None,
        exit_code: Some(0),
    }));
    history.push(tool);
    history.push(dialogue(ChatRole::System, "system notice"));
    history.push(dialogue(ChatRole::Error, "agent failed"));

    let prompt = build_chat_prompt(&history, "latest", 6);

    assert!(!prompt.contains("internal detail"));
    assert!(!prompt.contains("system notice"));
    assert!(!prompt.contains("agent failed"));
    assert!(prompt.contains("User: latest"));
}

/// Context-, sample-, and summary-flagged dialogue never appears.
#[test]
fn flagged_dialogue_is_filtered() {
    let mut history = base_history();

    let mut context = dialogue(ChatRole::Assistant, "injected file context");
    context.meta = Some(MessageMeta::Context);
    history.push(context);

    let mut sample = dialogue(ChatRole::Assistant, "sample content");
    sample.meta = Some(MessageMeta::Sample);
    history.push(sample);

    let mut summary = dialogue(ChatRole::Assistant, "tool summary text");
    summary.meta = Some(MessageMeta::ToolSummary);
    history.push(summary);

    let prompt = build_chat_prompt(&history, "latest", 10);

    assert!(!prompt.contains("injected file context"));
    assert!(!prompt.contains("sample content"));
    assert!(!prompt.contains("tool summary text"));
    assert!(prompt.contains("User: How are you?"));
    assert!(prompt.contains("Assistant: Great!"));
}

/// The fixed preamble opens every prompt and history stays chronological.
#[test]
fn preamble_and_chronological_order() {
    let history = base_history();
    let prompt = build_chat_prompt(&history, "next", 6);

    assert!(prompt.starts_with("You are an AI coding assistant.\n\n"));
    let user_pos = prompt.find("User: How are you?").expect("user line");
    let assistant_pos = prompt.find("Assistant: Great!").expect("assistant line");
    assert!(user_pos < assistant_pos);

    // Timestamps exist on every dialogue message.
    assert!(history.iter().all(|m| m.timestamp <= Utc::now()));
}

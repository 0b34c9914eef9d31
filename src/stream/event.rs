//! Decoded stream events from the agent's NDJSON output.
//!
//! The agent emits one tagged JSON object per line. Only two tags carry
//! turn semantics: `assistant` (an array of content blocks) and `result`
//! (the terminal marker for one turn). Every other tag is tolerated and
//! skipped; the CLI also emits `system` and `stream_event` lines.
//!
//! Tool input and output payloads are not under this crate's control, so
//! they are modelled as loosely-typed [`serde_json::Value`]s with helpers
//! that probe a small fixed set of conventional field-name aliases.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{AppError, Result};

/// Field-name aliases probed for a shell command in tool input.
const COMMAND_ALIASES: &[&str] = &["command", "cmd"];

/// Field-name aliases probed for a file path in tool input.
const PATH_ALIASES: &[&str] = &["file_path", "path"];

/// One decoded event line from the agent stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Assistant output: a sequence of content blocks.
    Assistant {
        /// Message envelope carrying the content blocks.
        message: AssistantMessage,
    },
    /// Terminal marker: exactly one in-flight turn is complete.
    Result,
    /// Any other tag (`system`, `stream_event`, and so on); skipped.
    #[serde(other)]
    Other,
}

/// Envelope inside an `assistant` event.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    /// Content blocks in emission order.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One unit within an `assistant` event's payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// A streamed text delta.
    Text {
        /// The delta text.
        #[serde(default)]
        text: String,
    },
    /// A tool invocation.
    ToolUse(ToolUseBlock),
    /// A tool result, correlated back to its invocation by id.
    ToolResult(ToolResultBlock),
    /// Unrecognized block type; skipped.
    #[serde(other)]
    Other,
}

/// A `tool_use` content block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolUseBlock {
    /// Explicit tool-use identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Result-correlation identifier, used when `id` is absent.
    #[serde(default)]
    pub tool_use_id: Option<String>,
    /// Tool name.
    #[serde(default)]
    pub name: Option<String>,
    /// Untyped tool input payload.
    #[serde(default)]
    pub input: Value,
    /// Optional display label supplied by the agent.
    #[serde(default)]
    pub display: Option<String>,
    /// Optional title supplied by the agent.
    #[serde(default)]
    pub title: Option<String>,
}

impl ToolUseBlock {
    /// Derive a stable tool-call identifier: the explicit id, else the
    /// correlation id, else a value synthesized from the current time.
    #[must_use]
    pub fn stable_id(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.tool_use_id.clone())
            .unwrap_or_else(|| format!("tool-{}", Utc::now().timestamp_millis()))
    }

    /// Tool name, defaulting to `"Tool"` when absent.
    #[must_use]
    pub fn tool_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "Tool".to_owned())
    }

    /// Shell command extracted from the input payload, if present.
    #[must_use]
    pub fn command(&self) -> Option<String> {
        string_field(&self.input, COMMAND_ALIASES)
    }

    /// File path extracted from the input payload, if present.
    #[must_use]
    pub fn file_path(&self) -> Option<String> {
        string_field(&self.input, PATH_ALIASES)
    }

    /// Human-readable title: the agent's display label or title, else the
    /// tool name, else a `Run: <command>` synthesized label.
    #[must_use]
    pub fn derive_title(&self) -> Option<String> {
        self.display
            .clone()
            .or_else(|| self.title.clone())
            .or_else(|| self.name.clone())
            .or_else(|| self.command().map(|cmd| format!("Run: {cmd}")))
    }

    /// Short description of the invocation for the transcript record:
    /// a string input verbatim, else the command, else the file path,
    /// else a generic label.
    #[must_use]
    pub fn describe(&self) -> String {
        if let Value::String(s) = &self.input {
            return s.clone();
        }
        self.command()
            .or_else(|| self.file_path())
            .unwrap_or_else(|| "Tool call".to_owned())
    }
}

/// A `tool_result` content block.
///
/// Serializable so the structured-data fallback of [`describe`]
/// (`Self::describe`) can render the whole block, named fields included.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolResultBlock {
    /// Correlation identifier pointing at the originating `tool_use`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// Some agents echo the id under `id` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name, when repeated on the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Primary output payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Alternate output field used by some tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Alternate plain-text output field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
    /// Explicit error flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Error payload; presence alone signals a failed call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Process exit code for shell-style tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    /// Remaining fields, kept for the structured-data fallback rendering.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ToolResultBlock {
    /// Correlation identifier: `tool_use_id` preferred, else `id`.
    #[must_use]
    pub fn correlation_id(&self) -> Option<String> {
        self.tool_use_id.clone().or_else(|| self.id.clone())
    }

    /// Whether the payload signals an error condition.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.is_error == Some(true) || self.error.is_some()
    }

    /// Descriptive text for the transcript record: a string output field
    /// verbatim, else the joined items of an array (strings and `{text}`
    /// objects kept as text, anything else JSON-rendered), else a
    /// structured-data rendering of the entire block.
    #[must_use]
    pub fn describe(&self) -> String {
        let out = self
            .output
            .as_ref()
            .or(self.result.as_ref())
            .or(self.text.as_ref());
        match out {
            Some(value) => render_output(value),
            None => serde_json::to_value(self)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Render a loosely-typed tool output value as display text.
fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other
                    .get("text")
                    .and_then(Value::as_str)
                    .map_or_else(|| other.to_string(), ToString::to_string),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| other.get("stdout").and_then(Value::as_str))
            .map_or_else(|| other.to_string(), ToString::to_string),
    }
}

/// Probe `input` for the first string-valued field among `aliases`.
fn string_field(input: &Value, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find_map(|key| input.get(key).and_then(Value::as_str))
        .map(ToString::to_string)
}

/// Parse one NDJSON line into a [`StreamEvent`].
///
/// # Errors
///
/// Returns [`AppError::Stream`]`("malformed output: …")` when the line is
/// not valid JSON. Malformed output indicates a protocol mismatch with the
/// agent CLI, not a transient issue, so the caller fails every registered
/// turn rather than dropping the line.
pub fn parse_event(line: &str) -> Result<StreamEvent> {
    serde_json::from_str(line)
        .map_err(|e| AppError::Stream(format!("malformed output: {e}")))
}

/// Build the outbound user-turn object written to the agent's stdin.
///
/// Wire format, one line per turn:
/// `{"type":"user","message":{"role":"user","content":[{"type":"text","text":…}]}}`.
#[must_use]
pub fn user_turn(prompt: &str) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": prompt }],
        },
    })
}

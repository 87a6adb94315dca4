//! Structured-output parsing for the agent loops
//!
//! The LLM is instructed to emit labeled blocks (`<plan>`, `<report>`,
//! `<tool_call>`, `<answer>`, `<terminate>`, `<write_outline>`, `<write>`).
//! Models rehearse earlier in the response, so the *last non-empty* match of
//! each label wins. `<terminate>` is a presence signal and may appear
//! unclosed; a closed body becomes the termination reason. Tool-call payloads
//! are handed to the dispatcher verbatim, without JSON validation.

use regex::Regex;

/// Last non-empty `<tag>…</tag>` body in `text`, trimmed.
fn last_block(text: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?s)<{0}>(.*?)</{0}>", tag);
    let re = Regex::new(&pattern).expect("valid block pattern");
    re.captures_iter(text)
        .filter_map(|c| {
            let body = c[1].trim();
            if body.is_empty() {
                None
            } else {
                Some(body.to_string())
            }
        })
        .last()
}

/// Whether `<tag>` occurs at all (closed or not).
fn has_tag(text: &str, tag: &str) -> bool {
    text.contains(&format!("<{}>", tag))
}

/// Parsed output of one iterative-loop round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundOutput {
    /// Cognitive-draft block
    pub plan: String,
    /// The round's synthesized report (empty = keep previous)
    pub report: String,
    /// Raw tool-call payload (JSON-ish, possibly with a `<code>` tail)
    pub tool_call: String,
    /// Terminal answer, when present
    pub answer: String,
    /// Whether `<terminate>` appeared
    pub terminate: bool,
    /// Body of the terminate block, when non-empty
    pub terminate_reason: String,
}

impl RoundOutput {
    /// True when the round produced neither an action nor a terminal signal.
    pub fn is_empty_action(&self) -> bool {
        self.tool_call.is_empty() && self.answer.is_empty() && !self.terminate
    }
}

/// Parse one assistant response in the iterative plan/report/act protocol.
pub fn parse_round(text: &str) -> RoundOutput {
    let terminate = has_tag(text, "terminate");
    RoundOutput {
        plan: last_block(text, "plan").unwrap_or_default(),
        report: last_block(text, "report").unwrap_or_default(),
        tool_call: last_block(text, "tool_call").unwrap_or_default(),
        answer: last_block(text, "answer").unwrap_or_default(),
        terminate,
        terminate_reason: if terminate {
            last_block(text, "terminate").unwrap_or_default()
        } else {
            String::new()
        },
    }
}

/// One planner or writer action
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    /// Invoke a tool; payload is the raw call block
    ToolCall(String),
    /// Replace the current outline (planner)
    WriteOutline(String),
    /// Append a report section (writer)
    Write(String),
    /// Finish the loop
    Terminate,
    /// No recognizable action; payload is a human-readable diagnostic
    Error(String),
}

/// Parsed planner/writer response: plan plus exactly one action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub plan: String,
    pub action: AgentAction,
}

/// Parse a planner response: `<tool_call>` | `<write_outline>` | `<terminate>`.
pub fn parse_planner(text: &str) -> ActionOutput {
    let plan = last_block(text, "plan").unwrap_or_default();
    let action = if has_tag(text, "terminate") {
        AgentAction::Terminate
    } else if let Some(outline) = last_block(text, "write_outline") {
        AgentAction::WriteOutline(outline)
    } else if let Some(call) = last_block(text, "tool_call") {
        AgentAction::ToolCall(call)
    } else {
        AgentAction::Error(
            "No valid action tag found. Must use <tool_call>, <write_outline>, or <terminate>."
                .to_string(),
        )
    };
    ActionOutput { plan, action }
}

/// Parse a writer response: `<tool_call>` | `<write>` | `<terminate>`.
pub fn parse_writer(text: &str) -> ActionOutput {
    let plan = last_block(text, "plan").unwrap_or_default();
    let action = if has_tag(text, "terminate") {
        AgentAction::Terminate
    } else if let Some(section) = last_block(text, "write") {
        AgentAction::Write(section)
    } else if let Some(call) = last_block(text, "tool_call") {
        AgentAction::ToolCall(call)
    } else {
        AgentAction::Error(
            "No valid action tag found. Must use <tool_call> (retrieve), <write>, or <terminate>."
                .to_string(),
        )
    };
    ActionOutput { plan, action }
}

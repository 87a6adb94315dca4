//! Workspace state for the iterative research loop
//!
//! The workspace is the *only* state carried between rounds: the original
//! question, the evolving report, and the last tool observation. The report
//! is replaced exactly once per round (when the LLM emits one) and the
//! observation exactly once after tool execution.

use crate::agent::types::Message;

/// Initial report text shown to the model on round one
pub const INITIAL_REPORT: &str = "This is the first round. The report is empty.";
/// Initial observation text shown to the model on round one
pub const INITIAL_OBSERVATION: &str = "This is the first round. No tool has been called yet.";

/// Minimal per-round state of the iterative agent
#[derive(Debug, Clone)]
pub struct Workspace {
    /// The original question, never rewritten
    pub question: String,
    /// The evolving report (R_i)
    pub current_report: String,
    /// The last tool observation (O_i)
    pub last_observation: String,
}

impl Workspace {
    /// Fresh workspace for a question
    pub fn new(question: impl Into<String>) -> Self {
        Workspace {
            question: question.into(),
            current_report: INITIAL_REPORT.to_string(),
            last_observation: INITIAL_OBSERVATION.to_string(),
        }
    }

    /// Build the two-message context for the next round.
    pub fn context(&self, system_prompt: &str) -> Vec<Message> {
        let user_content = format!(
            "**Question:** {}\n\n**Current Report:**\n{}\n\n**Last Observation:**\n{}",
            self.question, self.current_report, self.last_observation
        );
        vec![Message::system(system_prompt), Message::user(user_content)]
    }
}

/// Estimate the token count of a message list.
///
/// Whitespace-delimited words plus one token per CJK character, with a small
/// per-message overhead. A deliberate approximation: the budget check only
/// needs to catch runaway prompts, not bill them.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| estimate_text_tokens(&m.content) + 4)
        .sum()
}

fn estimate_text_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let cjk = text
        .chars()
        .filter(|c| {
            let cp = *c as u32;
            (0x4E00..=0x9FFF).contains(&cp)
                || (0x3040..=0x30FF).contains(&cp)
                || (0xAC00..=0xD7AF).contains(&cp)
        })
        .count();
    words + cjk
}

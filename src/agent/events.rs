//! Progress events emitted by the agent loops
//!
//! Every event is timestamped and carries the round index where one applies.
//! Within a turn, events are appended in strict temporal order of the loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Discriminator for progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Reasoning text returned by a thinking-mode model
    Thinking,
    /// One loop round: plan/report/action/answer/terminate flags
    Round,
    /// A tool executed successfully
    Tool,
    /// A tool failed; observation carries the error text
    ToolError,
    /// Terminal event of a loop with the final answer
    Final,
    /// Loop finished without producing a `final` event
    Status,
    /// Per-turn summary recorded by the session
    Summary,
    /// Turn-level failure
    Error,
}

/// A single progress event
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentEvent {
    fn new(kind: EventKind) -> Self {
        AgentEvent {
            kind,
            timestamp: Utc::now(),
            round: None,
            plan: None,
            report: None,
            action: None,
            tool_call: None,
            observation: None,
            answer: None,
            terminate: None,
            termination: None,
            status: None,
            thinking: None,
            message: None,
        }
    }

    /// Reasoning text surfaced before the round event
    pub fn thinking(round: u32, text: impl Into<String>) -> Self {
        AgentEvent {
            round: Some(round),
            thinking: Some(text.into()),
            ..Self::new(EventKind::Thinking)
        }
    }

    /// One completed LLM round
    pub fn round(
        round: u32,
        plan: impl Into<String>,
        report: impl Into<String>,
        action: impl Into<String>,
        answer: impl Into<String>,
        terminate: bool,
    ) -> Self {
        AgentEvent {
            round: Some(round),
            plan: Some(plan.into()),
            report: Some(report.into()),
            action: Some(action.into()),
            answer: Some(answer.into()),
            terminate: Some(terminate),
            ..Self::new(EventKind::Round)
        }
    }

    /// Successful tool execution
    pub fn tool(round: u32, tool_call: impl Into<String>, observation: impl Into<String>) -> Self {
        AgentEvent {
            round: Some(round),
            tool_call: Some(tool_call.into()),
            observation: Some(observation.into()),
            ..Self::new(EventKind::Tool)
        }
    }

    /// Failed tool execution
    pub fn tool_error(
        round: u32,
        tool_call: impl Into<String>,
        observation: impl Into<String>,
    ) -> Self {
        AgentEvent {
            round: Some(round),
            tool_call: Some(tool_call.into()),
            observation: Some(observation.into()),
            ..Self::new(EventKind::ToolError)
        }
    }

    /// Terminal event carrying the final answer
    pub fn final_answer(
        round: u32,
        answer: impl Into<String>,
        report: impl Into<String>,
        termination: impl Into<String>,
    ) -> Self {
        AgentEvent {
            round: Some(round),
            answer: Some(answer.into()),
            report: Some(report.into()),
            termination: Some(termination.into()),
            ..Self::new(EventKind::Final)
        }
    }

    /// Loop exit status when no `final` event was produced
    pub fn status(
        status: impl Into<String>,
        answer: impl Into<String>,
        report: impl Into<String>,
    ) -> Self {
        AgentEvent {
            status: Some(status.into()),
            answer: Some(answer.into()),
            report: Some(report.into()),
            ..Self::new(EventKind::Status)
        }
    }

    /// Per-turn summary appended by the session
    pub fn summary(
        answer: impl Into<String>,
        report: impl Into<String>,
        termination: impl Into<String>,
    ) -> Self {
        AgentEvent {
            answer: Some(answer.into()),
            report: Some(report.into()),
            termination: Some(termination.into()),
            ..Self::new(EventKind::Summary)
        }
    }

    /// Turn-level failure message
    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent {
            message: Some(message.into()),
            ..Self::new(EventKind::Error)
        }
    }
}

/// Callback used by loops to report progress to the caller (e.g. a session).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Receive one event. Implementations must not block the loop for long.
    async fn emit(&self, event: AgentEvent);
}

/// Default sink that discards all events
pub struct NoOpSink;

#[async_trait]
impl ProgressSink for NoOpSink {
    async fn emit(&self, _event: AgentEvent) {}
}

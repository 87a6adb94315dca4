//! Conversation turns and their structured research process
//!
//! A turn is one user question and its complete agent-loop execution. Besides
//! the raw ordered event log, each turn derives a structured process summary
//! (per-round plan/report, per-tool observation) that the UI renders without
//! replaying events. Status moves strictly forward: pending → running →
//! completed | failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::events::{AgentEvent, EventKind};

/// Turn lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TurnStatus {
    /// Whether the turn reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self, TurnStatus::Completed | TurnStatus::Failed)
    }
}

/// One research round in the process summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRound {
    pub round: u32,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub report: String,
    pub timestamp: DateTime<Utc>,
}

/// One tool invocation in the process summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTool {
    pub round: u32,
    pub tool: String,
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

/// Structured research process of one turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessData {
    pub rounds: Vec<ProcessRound>,
    pub tools: Vec<ProcessTool>,
}

/// One question/answer exchange with its full event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub task_id: String,
    pub question: String,
    #[serde(default)]
    pub answer: String,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub process: ProcessData,
}

impl ConversationTurn {
    /// Create a running turn for a question
    pub fn new(question: impl Into<String>) -> Self {
        ConversationTurn {
            task_id: Uuid::new_v4().simple().to_string(),
            question: question.into(),
            answer: String::new(),
            status: TurnStatus::Running,
            created_at: Utc::now(),
            events: Vec::new(),
            result: None,
            error: None,
            process: ProcessData::default(),
        }
    }

    /// Append one event and fold it into the process summary.
    pub fn record_event(&mut self, event: &AgentEvent) {
        match event.kind {
            EventKind::Round => {
                self.upsert_round(
                    event.round.unwrap_or(1),
                    event.plan.clone().unwrap_or_default(),
                    event.report.clone().unwrap_or_default(),
                    event.timestamp,
                );
            }
            EventKind::Tool | EventKind::ToolError => {
                self.process.tools.push(ProcessTool {
                    round: event.round.unwrap_or(1),
                    tool: event.tool_call.clone().unwrap_or_else(|| "unknown".to_string()),
                    observation: event.observation.clone().unwrap_or_default(),
                    is_error: event.kind == EventKind::ToolError,
                    timestamp: event.timestamp,
                });
            }
            _ => {}
        }
        if let Ok(value) = serde_json::to_value(event) {
            self.events.push(value);
        }
    }

    /// Update-or-insert a round entry, keeping one record per round index.
    fn upsert_round(&mut self, round: u32, plan: String, report: String, timestamp: DateTime<Utc>) {
        if let Some(existing) = self.process.rounds.iter_mut().find(|r| r.round == round) {
            if !plan.is_empty() {
                existing.plan = plan;
            }
            if !report.is_empty() {
                existing.report = report;
            }
            existing.timestamp = timestamp;
            return;
        }
        self.process.rounds.push(ProcessRound {
            round,
            plan,
            report,
            timestamp,
        });
    }

    /// The report of the last round that produced one.
    pub fn last_report(&self) -> String {
        self.process
            .rounds
            .iter()
            .rev()
            .find(|r| !r.report.is_empty())
            .map(|r| r.report.clone())
            .unwrap_or_default()
    }
}

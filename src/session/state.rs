//! Session state: a sequence of turns under a shared instruction/tool policy
//!
//! The session owns its turns behind one mutex; every mutation bumps
//! `updated_at` and wakes SSE subscribers through a `Notify`. At most one
//! turn is running at a time, enforced at `begin_turn`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::agent::events::AgentEvent;
use crate::error::{Error, Result};

use super::turn::{ConversationTurn, ProcessData, TurnStatus};

/// Which loop variant a session runs per turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Iterative single-report loop
    #[default]
    Researcher,
    /// Planner/writer dual loop
    Weaver,
    /// Parallel sampling with synthesis
    Scaling,
}

impl std::str::FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "researcher" | "web_researcher" => Ok(AgentKind::Researcher),
            "weaver" | "webweaver" => Ok(AgentKind::Weaver),
            "scaling" | "tts" => Ok(AgentKind::Scaling),
            other => Err(Error::InvalidInput(format!(
                "Unknown agent kind: {}. Valid options: researcher, weaver, scaling",
                other
            ))),
        }
    }
}

/// Creation-time session options
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub agent: AgentKind,
    /// Parallel sample count for `Scaling`
    pub num_samples: usize,
    /// How many completed turns feed the history context (K)
    pub max_history_turns: usize,
    pub instruction: String,
    pub tools: Option<Vec<String>>,
}

/// Serializable session snapshot: the persisted JSONL record and the full
/// GET payload are the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
    #[serde(default)]
    pub first_question: String,
    #[serde(default)]
    pub turn_count: usize,
}

/// Brief session info for list views
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
    pub first_question: String,
    pub last_answer: String,
}

/// Structured process payload for one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnProcess {
    pub session_id: String,
    pub turn_index: usize,
    pub task_id: String,
    pub question: String,
    pub answer: String,
    pub status: TurnStatus,
    pub process: ProcessData,
}

struct SessionInner {
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
    /// Index of the turn events are currently routed to
    current: Option<usize>,
}

/// A multi-turn research session
pub struct Session {
    pub id: String,
    pub options: SessionOptions,
    inner: Mutex<SessionInner>,
    notify: Notify,
}

impl Session {
    /// Create an active session
    pub fn new(options: SessionOptions) -> Self {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4().simple().to_string(),
            options,
            inner: Mutex::new(SessionInner {
                status: "active".to_string(),
                created_at: now,
                updated_at: now,
                turns: Vec::new(),
                current: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Rebuild a read-only session from a persisted record.
    pub fn from_record(record: SessionRecord) -> Self {
        Session {
            id: record.session_id,
            options: SessionOptions::default(),
            inner: Mutex::new(SessionInner {
                status: record.status,
                created_at: record.created_at,
                updated_at: record.updated_at,
                turns: record.turns,
                current: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Start a new running turn. Fails while another turn is running.
    pub fn begin_turn(&self, question: &str) -> Result<String> {
        let mut inner = self.lock();
        if let Some(index) = inner.current {
            if inner.turns[index].status == TurnStatus::Running {
                return Err(Error::Session(
                    "a turn is already running in this session".to_string(),
                ));
            }
        }
        let turn = ConversationTurn::new(question);
        let task_id = turn.task_id.clone();
        inner.turns.push(turn);
        inner.current = Some(inner.turns.len() - 1);
        inner.updated_at = Utc::now();
        drop(inner);
        self.notify.notify_waiters();
        Ok(task_id)
    }

    /// Append an event to the current turn and wake subscribers.
    pub fn record_event(&self, event: &AgentEvent) {
        let mut inner = self.lock();
        if let Some(index) = inner.current {
            inner.turns[index].record_event(event);
            inner.updated_at = Utc::now();
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Complete the current turn.
    pub fn finish_turn(
        &self,
        answer: String,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let mut inner = self.lock();
        if let Some(index) = inner.current {
            let turn = &mut inner.turns[index];
            turn.answer = answer;
            turn.result = result;
            turn.status = if error.is_none() {
                TurnStatus::Completed
            } else {
                TurnStatus::Failed
            };
            turn.error = error;
            inner.updated_at = Utc::now();
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Register for the next state change. Must be polled after a snapshot
    /// taken *after* this call to avoid missed wakeups.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Whether a live turn is attached (historical sessions have none).
    pub fn has_current_turn(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Events of the current turn from `from`, with the turn's index, status,
    /// answer, error, and last report. Used by the SSE fan-out.
    #[allow(clippy::type_complexity)]
    pub fn stream_snapshot(
        &self,
        from: usize,
    ) -> Option<(Vec<serde_json::Value>, usize, TurnStatus, String, Option<String>, String)> {
        let inner = self.lock();
        let index = inner.current?;
        let turn = &inner.turns[index];
        let fresh = turn.events.iter().skip(from).cloned().collect();
        Some((
            fresh,
            index,
            turn.status,
            turn.answer.clone(),
            turn.error.clone(),
            turn.last_report(),
        ))
    }

    /// Render the most recent completed turns as the history block injected
    /// into the next turn's instruction. The question itself is never
    /// contaminated.
    pub fn history_context(&self) -> String {
        let inner = self.lock();
        if inner.turns.len() <= 1 {
            return String::new();
        }
        let completed: Vec<&ConversationTurn> = inner.turns[..inner.turns.len() - 1]
            .iter()
            .filter(|t| t.status == TurnStatus::Completed && !t.answer.is_empty())
            .collect();
        if completed.is_empty() {
            return String::new();
        }
        let keep = self.options.max_history_turns.max(1);
        let recent = if completed.len() > keep {
            &completed[completed.len() - keep..]
        } else {
            &completed[..]
        };

        let mut parts = vec![
            "## Previous Conversation History".to_string(),
            format!(
                "The following are the previous {} round(s) of conversation in this session.",
                recent.len()
            ),
            "You should use this information to understand the context and provide better answers for the current question.".to_string(),
            "DO NOT repeat information from previous answers unless specifically asked.".to_string(),
            String::new(),
        ];
        for (i, turn) in recent.iter().enumerate() {
            parts.push(format!("### Previous Round {}", i + 1));
            parts.push(format!("User Question: {}", turn.question));
            parts.push(format!("Your Answer: {}", turn.answer));
            parts.push(String::new());
        }
        parts.join("\n")
    }

    /// Full serializable snapshot
    pub fn to_record(&self) -> SessionRecord {
        let inner = self.lock();
        SessionRecord {
            session_id: self.id.clone(),
            status: inner.status.clone(),
            created_at: inner.created_at,
            updated_at: inner.updated_at,
            turns: inner.turns.clone(),
            first_question: inner
                .turns
                .first()
                .map(|t| t.question.clone())
                .unwrap_or_default(),
            turn_count: inner.turns.len(),
        }
    }

    /// Brief info for list views
    pub fn summary(&self) -> SessionSummary {
        let inner = self.lock();
        SessionSummary {
            session_id: self.id.clone(),
            status: inner.status.clone(),
            created_at: inner.created_at,
            updated_at: inner.updated_at,
            turn_count: inner.turns.len(),
            first_question: inner
                .turns
                .first()
                .map(|t| t.question.clone())
                .unwrap_or_default(),
            last_answer: inner
                .turns
                .last()
                .map(|t| t.answer.clone())
                .unwrap_or_default(),
        }
    }

    /// Structured process for the turn at `index`.
    pub fn turn_process(&self, index: usize) -> Option<TurnProcess> {
        let inner = self.lock();
        let turn = inner.turns.get(index)?;
        Some(TurnProcess {
            session_id: self.id.clone(),
            turn_index: index,
            task_id: turn.task_id.clone(),
            question: turn.question.clone(),
            answer: turn.answer.clone(),
            status: turn.status,
            process: turn.process.clone(),
        })
    }

    /// Structured process for the turn with `task_id`.
    pub fn task_process(&self, task_id: &str) -> Option<TurnProcess> {
        let index = {
            let inner = self.lock();
            inner.turns.iter().position(|t| t.task_id == task_id)?
        };
        self.turn_process(index)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session lock")
    }
}

//! Session manager: turn scheduling and append-only persistence
//!
//! The manager owns the live sessions, spawns one agent-loop task per
//! submitted question, and appends a full session snapshot to the JSONL
//! history file when a turn finishes. Reads merge in-memory sessions with
//! persisted records; live sessions shadow file records of the same ID.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::agent::events::{AgentEvent, ProgressSink};
use crate::agent::{LlmClient, ResearchAgent, ScalingAgent, WeaverAgent};
use crate::config::Config;
use crate::error::Result;
use crate::tools::{default_registry, ToolRegistry};

use super::state::{AgentKind, Session, SessionOptions, SessionRecord};

/// Progress sink that records events into a session's current turn
struct SessionSink {
    session: Arc<Session>,
}

#[async_trait]
impl ProgressSink for SessionSink {
    async fn emit(&self, event: AgentEvent) {
        self.session.record_event(&event);
    }
}

/// Manager of live sessions and the history file
pub struct SessionManager {
    config: Config,
    llm: Arc<LlmClient>,
    registry: Arc<ToolRegistry>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    history_path: PathBuf,
    history_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Build a manager, its shared LLM client, and the default tool registry.
    pub fn new(config: Config) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(config.llm.clone())?);
        let registry = Arc::new(default_registry(&config, llm.clone()));
        let history_path = config.history_path.clone();
        Ok(SessionManager {
            config,
            llm,
            registry,
            sessions: Mutex::new(HashMap::new()),
            history_path,
            history_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Create and register a new session.
    pub fn create_session(&self, options: SessionOptions) -> Arc<Session> {
        let session = Arc::new(Session::new(options));
        self.sessions
            .lock()
            .expect("sessions lock")
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Fetch a session: live ones first, then the history file (read-only).
    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        if let Some(session) = self
            .sessions
            .lock()
            .expect("sessions lock")
            .get(session_id)
            .cloned()
        {
            return Some(session);
        }
        self.load_session_from_history(session_id).await
    }

    async fn load_session_from_history(&self, session_id: &str) -> Option<Arc<Session>> {
        let records = self.read_file_records().await;
        // The newest snapshot of the session wins.
        records
            .into_iter()
            .rev()
            .find(|r| r.session_id == session_id)
            .map(|r| Arc::new(Session::from_record(r)))
    }

    /// Schedule one research turn; returns its task id.
    pub fn start_research(
        self: Arc<Self>,
        session: Arc<Session>,
        question: String,
    ) -> Result<String> {
        let task_id = session.begin_turn(&question)?;
        tokio::spawn(async move {
            self.run_research(session, question).await;
        });
        Ok(task_id)
    }

    async fn run_research(&self, session: Arc<Session>, question: String) {
        let history = session.history_context();
        let mut instruction = session.options.instruction.clone();
        if !history.is_empty() {
            instruction = format!("{}\n\n{}", instruction, history).trim().to_string();
        }

        let registry = match &session.options.tools {
            Some(tools) if !tools.is_empty() => Arc::new(self.registry.subset(tools)),
            _ => self.registry.clone(),
        };
        let sink = SessionSink {
            session: session.clone(),
        };
        info!(
            "Starting {:?} research for session {} (turn {})",
            session.options.agent,
            session.id,
            session.to_record().turn_count
        );

        let (answer, result, error) = match session.options.agent {
            AgentKind::Researcher => {
                let agent =
                    ResearchAgent::new(self.llm.clone(), registry, self.config.limits.clone())
                        .with_instruction(instruction);
                let outcome = agent.run(&question, &sink).await;
                session.record_event(&AgentEvent::summary(
                    outcome.prediction.clone(),
                    outcome.report.clone(),
                    outcome.termination.clone(),
                ));
                let result = serde_json::json!({
                    "question": outcome.question,
                    "prediction": outcome.prediction,
                    "report": outcome.report,
                    "termination": outcome.termination,
                    "trajectory": outcome.trajectory,
                });
                (outcome.prediction, Some(result), None)
            }
            AgentKind::Weaver => {
                let agent =
                    WeaverAgent::new(self.llm.clone(), registry, self.config.limits.clone())
                        .with_instruction(instruction);
                let outcome = agent.run(&question, &sink).await;
                let result = serde_json::json!({
                    "question": outcome.question,
                    "final_outline": outcome.final_outline,
                    "final_report": outcome.final_report,
                    "memory_bank_size": outcome.memory_bank_size,
                    "total_time_seconds": outcome.elapsed.as_secs_f64(),
                });
                match outcome.error {
                    Some(e) => (String::new(), Some(result), Some(e)),
                    None => {
                        session.record_event(&AgentEvent::summary(
                            outcome.final_report.clone(),
                            outcome.final_outline.clone(),
                            "completed".to_string(),
                        ));
                        (outcome.final_report, Some(result), None)
                    }
                }
            }
            AgentKind::Scaling => {
                let samples = session.options.num_samples.max(2);
                let agent = ScalingAgent::new(
                    self.config.llm.clone(),
                    registry,
                    self.config.limits.clone(),
                    samples,
                )
                .with_instruction(instruction);
                let outcome = agent.run(&question, &sink).await;
                let sample_reports: Vec<serde_json::Value> = outcome
                    .samples
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "agent": s.index + 1,
                            "temperature": s.temperature,
                            "termination": s.result.as_ref().map(|r| r.termination.clone()),
                            "answer": s.result.as_ref().map(|r| r.prediction.clone()),
                            "error": s.error,
                        })
                    })
                    .collect();
                session.record_event(&AgentEvent::summary(
                    outcome.final_answer.clone(),
                    String::new(),
                    "synthesized".to_string(),
                ));
                let result = serde_json::json!({
                    "question": outcome.question,
                    "final_synthesized_answer": outcome.final_answer,
                    "parallel_runs": sample_reports,
                });
                (outcome.final_answer, Some(result), None)
            }
        };

        if let Some(ref e) = error {
            error!("Research failed in session {}: {}", session.id, e);
            session.record_event(&AgentEvent::error(e.clone()));
        } else {
            info!("Research completed for session {}", session.id);
        }
        session.finish_turn(answer, result, error);

        if let Err(e) = self.persist_session(&session).await {
            warn!("Failed to persist session {}: {}", session.id, e);
        }
    }

    /// Append one full session snapshot to the history file.
    async fn persist_session(&self, session: &Session) -> Result<()> {
        let record = session.to_record();
        let line = serde_json::to_string(&record)?;

        let _guard = self.history_lock.lock().await;
        if let Some(parent) = self.history_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut contents = line;
        contents.push('\n');
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        Ok(())
    }

    async fn read_file_records(&self) -> Vec<SessionRecord> {
        let Ok(contents) = tokio::fs::read_to_string(&self.history_path).await else {
            return Vec::new();
        };
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SessionRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skip malformed history line: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Newest-first history merging live sessions and the file, deduplicated
    /// by session id.
    pub async fn read_history(&self, limit: usize) -> Vec<SessionRecord> {
        let mut combined = self.read_file_records().await;
        {
            let sessions = self.sessions.lock().expect("sessions lock");
            combined.extend(sessions.values().map(|s| s.to_record()));
        }
        combined.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut seen = std::collections::HashSet::new();
        let mut unique: Vec<SessionRecord> = combined
            .into_iter()
            .filter(|r| seen.insert(r.session_id.clone()))
            .collect();
        if limit > 0 {
            unique.truncate(limit);
        }
        unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentLimits, FileConfig, LlmConfig, SandboxConfig, SearchConfig};
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String, history: PathBuf) -> Config {
        Config {
            llm: LlmConfig {
                api_key: SecretString::from("test-key"),
                base_url,
                model: "test-model".to_string(),
                summary_model: "test-model".to_string(),
                timeout: Duration::from_secs(5),
                max_retries: 1,
                thinking_mode: None,
            },
            limits: AgentLimits {
                max_llm_calls: 3,
                agent_timeout: Duration::from_secs(30),
                max_input_tokens: 100_000,
            },
            search: SearchConfig::default(),
            sandbox: SandboxConfig::default(),
            files: FileConfig::default(),
            history_path: history,
        }
    }

    async fn answering_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": "<plan>p</plan><report>r</report><answer>the answer</answer>"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;
        server
    }

    async fn wait_until_finished(session: &Session) {
        for _ in 0..200 {
            let record = session.to_record();
            if record
                .turns
                .last()
                .map(|t| t.status.is_finished())
                .unwrap_or(false)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("turn did not finish in time");
    }

    #[tokio::test]
    async fn full_turn_records_events_and_persists() {
        let server = answering_server().await;
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history.jsonl");
        let manager = Arc::new(
            SessionManager::new(test_config(server.uri(), history.clone())).unwrap(),
        );

        let session = manager.create_session(SessionOptions {
            max_history_turns: 5,
            ..Default::default()
        });
        manager
            .clone()
            .start_research(session.clone(), "capital of France?".to_string())
            .unwrap();
        wait_until_finished(&session).await;

        let record = session.to_record();
        assert_eq!(record.turns.len(), 1);
        assert_eq!(record.turns[0].answer, "the answer");
        assert!(record.turns[0].process.rounds.len() >= 1);
        // A summary event precedes completion.
        assert!(record.turns[0]
            .events
            .iter()
            .any(|e| e["type"] == "summary"));

        // Persisted snapshot reconstructs the same turn (persistence happens
        // in a follow-up await after the turn is marked finished, so poll
        // briefly for the file to appear rather than racing it).
        let mut contents = String::new();
        for _ in 0..200 {
            if let Ok(data) = std::fs::read_to_string(&history) {
                if !data.is_empty() {
                    contents = data;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!contents.is_empty(), "history file was not persisted in time");
        let persisted: SessionRecord =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(persisted.session_id, session.id);
        assert_eq!(persisted.turns[0].answer, "the answer");
        assert_eq!(
            persisted.turns[0].process.rounds.len(),
            record.turns[0].process.rounds.len()
        );
    }

    #[tokio::test]
    async fn history_merges_and_dedups_by_session_id() {
        let server = answering_server().await;
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history.jsonl");
        let manager = Arc::new(
            SessionManager::new(test_config(server.uri(), history.clone())).unwrap(),
        );

        let session = manager.create_session(SessionOptions::default());
        manager
            .clone()
            .start_research(session.clone(), "q1".to_string())
            .unwrap();
        wait_until_finished(&session).await;
        manager
            .clone()
            .start_research(session.clone(), "q2".to_string())
            .unwrap();
        wait_until_finished(&session).await;

        // Two file lines, one live session: exactly one history item.
        let items = manager.read_history(20).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].turn_count, 2);
    }

    #[tokio::test]
    async fn malformed_history_lines_are_skipped() {
        let server = answering_server().await;
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history.jsonl");
        std::fs::write(&history, "not json\n").unwrap();

        let manager = Arc::new(
            SessionManager::new(test_config(server.uri(), history)).unwrap(),
        );
        assert!(manager.read_history(10).await.is_empty());
    }

    #[tokio::test]
    async fn second_turn_sees_history_in_instruction() {
        // The instruction enhancement is observable through the prompt the
        // LLM receives; assert indirectly through session state.
        let server = answering_server().await;
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(
            SessionManager::new(test_config(server.uri(), dir.path().join("h.jsonl"))).unwrap(),
        );
        let session = manager.create_session(SessionOptions {
            max_history_turns: 5,
            ..Default::default()
        });
        manager
            .clone()
            .start_research(session.clone(), "q1".to_string())
            .unwrap();
        wait_until_finished(&session).await;

        let history = session.history_context();
        assert!(history.is_empty(), "no history until a new turn starts");
        session.begin_turn("q2").unwrap();
        assert!(session.history_context().contains("User Question: q1"));
    }

    #[tokio::test]
    async fn loads_historical_session_read_only() {
        let server = answering_server().await;
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history.jsonl");
        let manager = Arc::new(
            SessionManager::new(test_config(server.uri(), history.clone())).unwrap(),
        );

        let session = manager.create_session(SessionOptions::default());
        let id = session.id.clone();
        manager
            .clone()
            .start_research(session.clone(), "q".to_string())
            .unwrap();
        wait_until_finished(&session).await;

        // Persistence happens in a follow-up await after the turn is marked
        // finished, so poll briefly for the file to appear rather than
        // racing it.
        for _ in 0..200 {
            if std::fs::metadata(&history).map(|m| m.len() > 0).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Drop the live copy; the file record must reconstruct it.
        manager.sessions.lock().unwrap().clear();
        let loaded = manager.get_session(&id).await.expect("loaded from file");
        assert!(!loaded.has_current_turn());
        assert_eq!(loaded.to_record().turns.len(), 1);
    }
}

//! Planner/writer dual-agent loop
//!
//! Two specialized loops run in sequence over one shared memory bank. The
//! planner explores with evidence-collecting tools and maintains an outline;
//! the writer retrieves evidence by citation ID and appends report sections.
//! The writer carries guards against degenerate retrieve-forever behavior: a
//! duplicate retrieve returns the cached evidence plus an explicit directive
//! to write, and too many consecutive non-write rounds append a write-now
//! hint to the observation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::agent::client::{LlmClient, OBS_START};
use crate::agent::events::{AgentEvent, ProgressSink};
use crate::agent::output::{parse_planner, parse_writer, AgentAction};
use crate::agent::prompts::{
    planner_system_prompt, today_date, writer_system_prompt, PLANNER_FORCE_OUTLINE,
    WRITER_FORCE_WRITE, WRITER_IDLE_HINT,
};
use crate::agent::types::{GenerationOptions, Message};
use crate::config::AgentLimits;
use crate::tools::{evidence_registry, Dispatcher, MemoryBank, RetrieveTool, ToolRegistry};

/// Initial outline text shown to the planner
const INITIAL_OUTLINE: &str = "Outline is empty. Start by searching for information.";
/// Initial observation for the planner
const PLANNER_INITIAL_OBSERVATION: &str = "No observation yet.";
/// Initial observation for the writer
const WRITER_INITIAL_OBSERVATION: &str =
    "No observation yet. Start by retrieving evidence for the first section.";
/// Consecutive non-write rounds tolerated before the write-now hint
const MAX_IDLE_BEFORE_WRITE_HINT: u32 = 6;

/// Result bundle of one dual-agent run
#[derive(Debug, Clone)]
pub struct WeaverOutcome {
    pub question: String,
    pub final_outline: String,
    pub final_report: String,
    pub memory_bank_size: usize,
    pub elapsed: Duration,
    /// Phase failure, when one of the loops timed out
    pub error: Option<String>,
}

/// Dual-agent research orchestrator
pub struct WeaverAgent {
    llm: Arc<LlmClient>,
    registry: Arc<ToolRegistry>,
    limits: AgentLimits,
    options: GenerationOptions,
    instruction: String,
}

impl WeaverAgent {
    /// Create a dual agent over the general tool registry
    pub fn new(llm: Arc<LlmClient>, registry: Arc<ToolRegistry>, limits: AgentLimits) -> Self {
        WeaverAgent {
            llm,
            registry,
            limits,
            options: GenerationOptions::focused(),
            instruction: String::new(),
        }
    }

    /// Attach a task-specific instruction
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Override generation options
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Run planner then writer on one question.
    pub async fn run(&self, question: &str, sink: &dyn ProgressSink) -> WeaverOutcome {
        let started = Instant::now();
        let bank = MemoryBank::shared();

        // Phase 1: the planner fills the bank and produces the outline.
        let planner_registry = Arc::new(evidence_registry(&self.registry, bank.clone()));
        let planner = PlannerLoop {
            llm: self.llm.clone(),
            registry: planner_registry,
            limits: self.limits.clone(),
            options: self.options.clone(),
            instruction: self.instruction.clone(),
        };
        let final_outline =
            match tokio::time::timeout(self.limits.agent_timeout, planner.run(question, sink)).await
            {
                Ok(outline) => outline,
                Err(_) => {
                    warn!("Planner phase timed out");
                    return self.failed(question, started, &bank, "Planner phase error: timeout");
                }
            };
        info!(
            "Planner phase complete: {} evidence chunks",
            bank.lock().expect("memory bank lock").size()
        );

        // Phase 2: the writer reads the bank and writes the report.
        let mut writer_registry = ToolRegistry::new();
        writer_registry.register(RetrieveTool::new(bank.clone()));
        let writer = WriterLoop {
            llm: self.llm.clone(),
            registry: Arc::new(writer_registry),
            limits: self.limits.clone(),
            options: self.options.clone(),
            instruction: self.instruction.clone(),
        };
        let final_report = match tokio::time::timeout(
            self.limits.agent_timeout,
            writer.run(question, &final_outline, sink),
        )
        .await
        {
            Ok(report) => report,
            Err(_) => {
                warn!("Writer phase timed out");
                return self.failed(question, started, &bank, "Writer phase error: timeout");
            }
        };

        let memory_bank_size = bank.lock().expect("memory bank lock").size();
        sink.emit(AgentEvent::final_answer(
            0,
            final_report.clone(),
            final_outline.clone(),
            "completed".to_string(),
        ))
        .await;

        WeaverOutcome {
            question: question.to_string(),
            final_outline,
            final_report,
            memory_bank_size,
            elapsed: started.elapsed(),
            error: None,
        }
    }

    fn failed(
        &self,
        question: &str,
        started: Instant,
        bank: &Arc<Mutex<MemoryBank>>,
        error: &str,
    ) -> WeaverOutcome {
        WeaverOutcome {
            question: question.to_string(),
            final_outline: String::new(),
            final_report: String::new(),
            memory_bank_size: bank.lock().expect("memory bank lock").size(),
            elapsed: started.elapsed(),
            error: Some(error.to_string()),
        }
    }
}

/// Planner loop: tool_call | write_outline | terminate
pub(crate) struct PlannerLoop {
    pub(crate) llm: Arc<LlmClient>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) limits: AgentLimits,
    pub(crate) options: GenerationOptions,
    pub(crate) instruction: String,
}

impl PlannerLoop {
    pub(crate) async fn run(&self, question: &str, sink: &dyn ProgressSink) -> String {
        let system_prompt =
            planner_system_prompt(&today_date(), &self.registry.names(), &self.instruction);
        let dispatcher = Dispatcher::new(self.registry.clone());
        let stop = vec![OBS_START.to_string()];

        let mut outline = INITIAL_OUTLINE.to_string();
        let mut observation = PLANNER_INITIAL_OBSERVATION.to_string();

        for i in 0..self.limits.max_llm_calls {
            let round = i + 1;
            let is_last = round == self.limits.max_llm_calls;

            let mut context = format!(
                "[Question]\n{question}\n\n[Current Outline]\n{outline}\n\n[Last Observation]\n{observation}\n\n\
                 **IMPORTANT: When you write the outline using <write_outline>, \
                 you MUST use the SAME LANGUAGE as the [Question] above. Do NOT translate.**",
            );
            if is_last {
                context.push_str(PLANNER_FORCE_OUTLINE);
            }
            let messages = vec![Message::system(&system_prompt), Message::user(context)];

            let reply = self.llm.complete(&messages, &self.options, &stop, None).await;
            let parsed = parse_planner(&reply.content);
            debug!("Planner step {} action: {:?}", round, parsed.action);

            sink.emit(AgentEvent::round(
                round,
                parsed.plan.clone(),
                outline.clone(),
                action_label(&parsed.action),
                String::new(),
                matches!(parsed.action, AgentAction::Terminate),
            ))
            .await;

            match parsed.action {
                AgentAction::Terminate => {
                    debug!("Planner finished after {} steps", round);
                    return outline;
                }
                AgentAction::WriteOutline(new_outline) => {
                    outline = new_outline;
                    observation = "Outline successfully updated.".to_string();
                }
                AgentAction::ToolCall(block) => {
                    observation = dispatcher.invoke(&block).await;
                    let event = if observation.starts_with("Error:") {
                        AgentEvent::tool_error(round, block, observation.clone())
                    } else {
                        AgentEvent::tool(round, block, observation.clone())
                    };
                    sink.emit(event).await;
                }
                AgentAction::Error(diagnostic) => {
                    warn!("Planner step {}: action parse error", round);
                    observation = diagnostic;
                }
                AgentAction::Write(_) => {
                    // Not a planner action; treat as a format slip.
                    observation =
                        "Invalid action <write>; use <write_outline> to update the outline."
                            .to_string();
                }
            }
        }

        warn!("Planner reached max iterations");
        outline
    }
}

/// Writer loop: tool_call(retrieve) | write | terminate, with retrieve guards
pub(crate) struct WriterLoop {
    pub(crate) llm: Arc<LlmClient>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) limits: AgentLimits,
    pub(crate) options: GenerationOptions,
    pub(crate) instruction: String,
}

impl WriterLoop {
    pub(crate) async fn run(
        &self,
        question: &str,
        final_outline: &str,
        sink: &dyn ProgressSink,
    ) -> String {
        let system_prompt = writer_system_prompt(&today_date(), &self.instruction);
        let dispatcher = Dispatcher::new(self.registry.clone());
        let stop = vec![OBS_START.to_string()];

        let mut report = String::new();
        let mut observation = WRITER_INITIAL_OBSERVATION.to_string();

        let mut seen_retrieve_keys: HashSet<String> = HashSet::new();
        let mut retrieve_repeats: HashMap<String, u32> = HashMap::new();
        let mut retrieve_cache: HashMap<String, String> = HashMap::new();
        let mut rounds_since_write: u32 = 0;

        for i in 0..self.limits.max_llm_calls {
            let round = i + 1;
            let is_last = round == self.limits.max_llm_calls;

            let mut context = format!(
                "[Question]\n{question}\n\n[Final Outline]\n{final_outline}\n\n\
                 [Report Written So Far]\n{report}\n\n[Last Observation]\n{observation}\n\n\
                 **CRITICAL LANGUAGE REQUIREMENT: The report you write using <write> MUST be \
                 in the SAME LANGUAGE as the [Question] and [Final Outline] above. \
                 Check the language carefully and DO NOT translate or switch languages.**",
            );
            if is_last {
                context.push_str(WRITER_FORCE_WRITE);
            }
            let messages = vec![Message::system(&system_prompt), Message::user(context)];

            let reply = self.llm.complete(&messages, &self.options, &stop, None).await;
            let parsed = parse_writer(&reply.content);
            debug!("Writer step {} action: {:?}", round, parsed.action);

            sink.emit(AgentEvent::round(
                round,
                parsed.plan.clone(),
                report.clone(),
                action_label(&parsed.action),
                String::new(),
                matches!(parsed.action, AgentAction::Terminate),
            ))
            .await;

            match parsed.action {
                AgentAction::Terminate => {
                    debug!("Writer finished after {} steps", round);
                    return report;
                }
                AgentAction::Write(section) => {
                    report.push_str("\n\n");
                    report.push_str(&section);
                    observation = format!("Section written successfully:\n{}\n", section);
                    rounds_since_write = 0;
                }
                AgentAction::ToolCall(block) => {
                    let key = retrieve_key(&block);

                    if let Some(ref key) = key {
                        if seen_retrieve_keys.contains(key) {
                            // Identical retrieve: return the cached evidence
                            // with an explicit directive to move on. No
                            // duplicate tool execution.
                            let repeat = retrieve_repeats.entry(key.clone()).or_insert(1);
                            *repeat += 1;
                            debug!(
                                "Writer step {}: duplicate retrieve (repeat {})",
                                round, repeat
                            );
                            let cached = retrieve_cache.get(key).cloned().unwrap_or_default();
                            observation = format!(
                                "Evidence for these citation IDs has already been retrieved. \
                                 Here is the evidence again:\n\n{}\n\n\
                                 You MUST now proceed to <write> the section using this evidence. \
                                 Do NOT call <tool_call> retrieve again for the same IDs.",
                                cached
                            );
                            sink.emit(AgentEvent::tool(round, block, observation.clone())).await;
                            rounds_since_write += 1;
                            continue;
                        }
                        seen_retrieve_keys.insert(key.clone());
                    }

                    observation = dispatcher.invoke(&block).await;
                    if let Some(key) = key {
                        retrieve_cache.insert(key, observation.clone());
                    }
                    let event = if observation.starts_with("Error:") {
                        AgentEvent::tool_error(round, block, observation.clone())
                    } else {
                        AgentEvent::tool(round, block, observation.clone())
                    };
                    sink.emit(event).await;
                    rounds_since_write += 1;
                }
                AgentAction::Error(diagnostic) => {
                    warn!("Writer step {}: action parse error", round);
                    observation = diagnostic;
                    rounds_since_write += 1;
                }
                AgentAction::WriteOutline(_) => {
                    observation =
                        "Invalid action <write_outline>; use <write> to append report text."
                            .to_string();
                    rounds_since_write += 1;
                }
            }

            if rounds_since_write >= MAX_IDLE_BEFORE_WRITE_HINT {
                observation.push_str(WRITER_IDLE_HINT);
            }
        }

        warn!("Writer reached max iterations");
        report
    }
}

fn action_label(action: &AgentAction) -> String {
    match action {
        AgentAction::ToolCall(block) => block.clone(),
        AgentAction::WriteOutline(_) => "write_outline".to_string(),
        AgentAction::Write(_) => "write".to_string(),
        AgentAction::Terminate => "terminate".to_string(),
        AgentAction::Error(_) => "error".to_string(),
    }
}

/// Canonical dedupe key for retrieve calls; `None` for other tools.
fn retrieve_key(block: &str) -> Option<String> {
    let parsed: serde_json::Value = json5::from_str(block).ok()?;
    if parsed.get("name").and_then(|v| v.as_str()) != Some("retrieve") {
        return None;
    }
    let args = parsed.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));
    serde_json::to_string(&args).ok()
}

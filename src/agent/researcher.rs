//! Iterative single-report research loop
//!
//! Each round the model sees only the question, the evolving report, and the
//! last observation, and must answer with plan + report + one action. The
//! loop ends on `<answer>`, `<terminate>`, the round budget, the token
//! budget, or the wall-clock deadline; forced-finalization calls sit outside
//! the round budget and are the last-ditch recovery from malformed output.
//! Whatever the exit path, `prediction` is never empty.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::agent::client::{LlmClient, OBS_END, OBS_START};
use crate::agent::events::{AgentEvent, ProgressSink};
use crate::agent::output::{parse_round, RoundOutput};
use crate::agent::prompts::{
    iterative_system_prompt, today_date, FINALIZE_LAST_ROUND, FORCE_ANSWER_FORMAT,
    TOKEN_LIMIT_DIRECTIVE,
};
use crate::agent::types::{GenerationOptions, Message, ToolDefinition};
use crate::agent::workspace::{estimate_tokens, Workspace, INITIAL_REPORT};
use crate::config::AgentLimits;
use crate::tools::{Dispatcher, ToolRegistry};

/// How the loop talks to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallMode {
    /// XML-tagged blocks with a stop sequence on the observation opener
    #[default]
    Textual,
    /// Native function calling; tool descriptors are passed through
    Native,
}

/// Result bundle of one loop invocation
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub question: String,
    /// Final answer; non-empty on every exit path
    pub prediction: String,
    /// The evolving report at exit
    pub report: String,
    /// Tagged termination reason, e.g. "answer found"
    pub termination: String,
    /// Initial context plus all assistant/observation messages
    pub trajectory: Vec<Message>,
}

/// Iterative research agent
pub struct ResearchAgent {
    llm: Arc<LlmClient>,
    registry: Arc<ToolRegistry>,
    limits: AgentLimits,
    options: GenerationOptions,
    instruction: String,
    call_mode: CallMode,
}

impl ResearchAgent {
    /// Create an agent over a client and tool registry
    pub fn new(llm: Arc<LlmClient>, registry: Arc<ToolRegistry>, limits: AgentLimits) -> Self {
        ResearchAgent {
            llm,
            registry,
            limits,
            options: GenerationOptions::default(),
            instruction: String::new(),
            call_mode: CallMode::default(),
        }
    }

    /// Attach a task-specific instruction appended to the system prompt
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Override generation options (parallel samples shift temperature here)
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Select the calling mode; fixed for the lifetime of the agent
    pub fn with_call_mode(mut self, mode: CallMode) -> Self {
        self.call_mode = mode;
        self
    }

    async fn call(&self, messages: &[Message], defs: &[ToolDefinition]) -> crate::agent::client::LlmReply {
        let stop = vec![OBS_START.to_string()];
        match self.call_mode {
            CallMode::Textual => self.llm.complete(messages, &self.options, &stop, None).await,
            CallMode::Native => {
                self.llm
                    .complete(messages, &self.options, &stop, Some(defs))
                    .await
            }
        }
    }

    /// Run the loop on one question, reporting progress to `sink`.
    pub async fn run(&self, question: &str, sink: &dyn ProgressSink) -> ResearchOutcome {
        let started = Instant::now();
        let mut workspace = Workspace::new(question);
        let defs = self.registry.definitions();
        let system_prompt = iterative_system_prompt(&today_date(), &defs, &self.instruction);
        let dispatcher = Dispatcher::new(self.registry.clone());

        let mut trajectory: Vec<Message> = Vec::new();
        let mut prediction = String::new();
        let mut termination = String::new();

        let mut remaining = self.limits.max_llm_calls;
        let mut round: u32 = 0;

        while remaining > 0 {
            if started.elapsed() > self.limits.agent_timeout {
                warn!("Agent timeout reached after {} rounds", round);
                termination = "timeout".to_string();
                prediction = if workspace.current_report != INITIAL_REPORT {
                    workspace.current_report.trim().to_string()
                } else {
                    "No answer found (timeout).".to_string()
                };
                break;
            }

            round += 1;
            remaining -= 1;
            info!("Research round {} (remaining calls: {})", round, remaining);

            let context = workspace.context(&system_prompt);
            if round == 1 {
                trajectory.extend(context.clone());
            }

            let is_last_call = remaining == 0;
            let request_msgs = if is_last_call {
                let mut msgs = context.clone();
                msgs.push(Message::user(FINALIZE_LAST_ROUND));
                msgs
            } else {
                context.clone()
            };

            let reply = self.call(&request_msgs, &defs).await;
            trajectory.push(Message::assistant(reply.content.clone()));

            if let Some(ref reasoning) = reply.reasoning {
                sink.emit(AgentEvent::thinking(round, reasoning.clone())).await;
            }

            let mut parsed = parse_round(&reply.content);
            adapt_native_reply(&mut parsed, &reply.tool_calls, &reply.content, self.call_mode);

            sink.emit(AgentEvent::round(
                round,
                parsed.plan.clone(),
                parsed.report.clone(),
                parsed.tool_call.clone(),
                parsed.answer.clone(),
                parsed.terminate,
            ))
            .await;

            // R_i replaces R_{i-1}; a missing report keeps the previous one.
            if !parsed.report.is_empty() {
                workspace.current_report = parsed.report.clone();
            } else {
                warn!("No <report> found in round {}; keeping previous report", round);
            }

            // Termination ladder: answer, terminate, last-round fallback.
            if !parsed.answer.is_empty() {
                prediction = parsed.answer.clone();
                termination = if parsed.terminate {
                    "terminate with answer".to_string()
                } else {
                    "answer found".to_string()
                };
                sink.emit(AgentEvent::final_answer(
                    round,
                    prediction.clone(),
                    workspace.current_report.clone(),
                    termination.clone(),
                ))
                .await;
                break;
            }
            if parsed.terminate {
                prediction = if parsed.terminate_reason.is_empty() {
                    workspace.current_report.trim().to_string()
                } else {
                    parsed.terminate_reason.clone()
                };
                termination = "terminated by llm".to_string();
                sink.emit(AgentEvent::final_answer(
                    round,
                    prediction.clone(),
                    workspace.current_report.clone(),
                    termination.clone(),
                ))
                .await;
                break;
            }
            if is_last_call {
                let fallback = workspace.current_report.trim();
                prediction = if !fallback.is_empty() {
                    fallback.to_string()
                } else {
                    workspace.last_observation.clone()
                };
                termination = "finalized without answer tag".to_string();
                warn!("Last call produced no <answer> or <terminate>; promoting report");
                sink.emit(AgentEvent::final_answer(
                    round,
                    prediction.clone(),
                    workspace.current_report.clone(),
                    termination.clone(),
                ))
                .await;
                break;
            }

            // Act.
            if !parsed.tool_call.is_empty() {
                debug!("Round {}: executing tool", round);
                let observation = dispatcher.invoke(&parsed.tool_call).await;
                let is_error = observation.starts_with("Error:");
                workspace.last_observation = observation.clone();
                trajectory.push(Message::user(format!(
                    "{}\n{}\n{}",
                    OBS_START, observation, OBS_END
                )));
                let event = if is_error {
                    AgentEvent::tool_error(round, parsed.tool_call.clone(), observation)
                } else {
                    AgentEvent::tool(round, parsed.tool_call.clone(), observation)
                };
                sink.emit(event).await;
            } else {
                // No action, no termination: one forced-finalization retry
                // outside the round budget.
                warn!("No action in round {}; forcing answer generation", round);
                let mut force_msgs = context.clone();
                force_msgs.push(Message::user(FORCE_ANSWER_FORMAT));
                let forced = self.call(&force_msgs, &defs).await;
                trajectory.push(Message::assistant(forced.content.clone()));
                let forced_parsed = parse_round(&forced.content);
                if !forced_parsed.answer.is_empty() {
                    prediction = forced_parsed.answer;
                    termination = "answer (forced)".to_string();
                    sink.emit(AgentEvent::final_answer(
                        round,
                        prediction.clone(),
                        workspace.current_report.clone(),
                        termination.clone(),
                    ))
                    .await;
                } else {
                    prediction = "No answer found (format error after retry).".to_string();
                    termination = "format error".to_string();
                }
                break;
            }

            // Token budget check on the prompt just sent.
            let token_count = estimate_tokens(&request_msgs);
            debug!("Round {} prompt tokens (estimated): {}", round, token_count);
            if token_count > self.limits.max_input_tokens {
                warn!("Token estimate {} exceeds limit; forcing final answer", token_count);
                let mut force_msgs = context;
                force_msgs.push(Message::user(TOKEN_LIMIT_DIRECTIVE));
                let forced = self.call(&force_msgs, &defs).await;
                trajectory.push(Message::assistant(forced.content.clone()));
                let forced_parsed = parse_round(&forced.content);
                prediction = if forced_parsed.answer.is_empty() {
                    "No answer found (token limit).".to_string()
                } else {
                    forced_parsed.answer
                };
                termination = "token limit reached".to_string();
                sink.emit(AgentEvent::final_answer(
                    round,
                    prediction.clone(),
                    workspace.current_report.clone(),
                    termination.clone(),
                ))
                .await;
                break;
            }
        }

        // The result is never empty: fall back through report and sentinels.
        if prediction.is_empty() {
            let report = workspace.current_report.trim();
            if !report.is_empty() {
                prediction = report.to_string();
                if termination.is_empty() {
                    termination = "report fallback".to_string();
                }
            } else if remaining == 0 {
                prediction = "No answer found (exceeded available LLM calls).".to_string();
                termination = "exceed available llm calls".to_string();
            } else {
                prediction = "No answer found.".to_string();
                termination = "answer not found".to_string();
            }
        }

        sink.emit(AgentEvent::status(
            if termination.is_empty() {
                "completed".to_string()
            } else {
                termination.clone()
            },
            prediction.clone(),
            workspace.current_report.clone(),
        ))
        .await;

        ResearchOutcome {
            question: question.to_string(),
            prediction,
            report: workspace.current_report,
            termination,
            trajectory,
        }
    }
}

/// In native mode, fold native tool calls (and bare text) into the parsed
/// round so the rest of the loop is mode-agnostic.
fn adapt_native_reply(
    parsed: &mut RoundOutput,
    tool_calls: &[crate::agent::types::AssistantToolCall],
    content: &str,
    mode: CallMode,
) {
    if mode != CallMode::Native {
        return;
    }
    if let Some(call) = tool_calls.first() {
        let arguments: serde_json::Value =
            json5::from_str(&call.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
        parsed.tool_call = serde_json::json!({
            "name": call.function.name,
            "arguments": arguments,
        })
        .to_string();
    } else if parsed.is_empty_action() && !content.trim().is_empty() {
        // Bare text without tags or calls is the model's answer.
        parsed.answer = content.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::NoOpSink;
    use crate::config::LlmConfig;
    use crate::error::Result;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm_for(server: &MockServer) -> Arc<LlmClient> {
        Arc::new(
            LlmClient::new(LlmConfig {
                api_key: SecretString::from("test-key"),
                base_url: server.uri(),
                model: "test-model".to_string(),
                summary_model: "test-model".to_string(),
                timeout: Duration::from_secs(5),
                max_retries: 1,
                thinking_mode: None,
            })
            .unwrap(),
        )
    }

    fn limits(max_calls: u32) -> AgentLimits {
        AgentLimits {
            max_llm_calls: max_calls,
            agent_timeout: Duration::from_secs(60),
            max_input_tokens: 100_000,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"content": content}, "finish_reason": "stop"}]})
    }

    struct CountingSearchTool {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for CountingSearchTool {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"query": {"type": "array", "items": {"type": "string"}}}})
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::success("Nobel Physics 2023: Agostini, Krausz, L'Huillier"))
        }
    }

    /// Sink that records event kinds in order.
    struct RecordingSink {
        kinds: StdMutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            RecordingSink {
                kinds: StdMutex::new(Vec::new()),
            }
        }
        fn kinds(&self) -> Vec<String> {
            self.kinds.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn emit(&self, event: AgentEvent) {
            let kind = serde_json::to_value(&event).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string();
            self.kinds.lock().unwrap().push(kind);
        }
    }

    #[tokio::test]
    async fn single_round_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>easy</plan><report>Paris is the capital.</report><answer>Paris</answer>",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits(5));
        let outcome = agent.run("capital of France?", &NoOpSink).await;

        assert_eq!(outcome.prediction, "Paris");
        assert_eq!(outcome.termination, "answer found");
        assert_eq!(outcome.report, "Paris is the capital.");
        // system + user context, then one assistant message.
        assert_eq!(outcome.trajectory.len(), 3);
    }

    #[tokio::test]
    async fn tool_then_answer() {
        let server = MockServer::start().await;
        // Round 2 sees the tool observation in the workspace.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Agostini"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>done</plan><report>Winners identified.</report><answer>Pierre Agostini, Ferenc Krausz, Anne L'Huillier</answer>",
            )))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>search it</plan><report>Searching.</report><tool_call>{\"name\": \"search\", \"arguments\": {\"query\": [\"Nobel Physics 2023\"]}}</tool_call>",
            )))
            .with_priority(5)
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingSearchTool { calls: calls.clone() });

        let sink = RecordingSink::new();
        let agent = ResearchAgent::new(llm_for(&server), Arc::new(registry), limits(5));
        let outcome = agent.run("Nobel Physics 2023 winners?", &sink).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.prediction.contains("Krausz"));
        assert_eq!(outcome.termination, "answer found");
        // Exactly one tool event between the two round events.
        let kinds = sink.kinds();
        let round_positions: Vec<usize> = kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| *k == "round")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(round_positions.len(), 2);
        assert_eq!(kinds[round_positions[0] + 1], "tool");
    }

    #[tokio::test]
    async fn terminate_without_answer_promotes_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>finish</plan><report>Full essay text.</report><terminate></terminate>",
            )))
            .mount(&server)
            .await;

        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits(5));
        let outcome = agent.run("write an essay", &NoOpSink).await;

        assert_eq!(outcome.prediction, "Full essay text.");
        assert_eq!(outcome.termination, "terminated by llm");
    }

    #[tokio::test]
    async fn single_call_budget_with_immediate_answer() {
        let server = MockServer::start().await;
        // R_max = 1: the finalize directive rides along, and the model
        // answers directly.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("maximum allowed LLM calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>p</plan><report>r</report><answer>direct</answer>",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits(1));
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.prediction, "direct");
        assert_eq!(outcome.termination, "answer found");
    }

    #[tokio::test]
    async fn last_round_with_tool_call_finalizes_without_answer_tag() {
        let server = MockServer::start().await;
        // R_max = 1: the only budgeted call carries the finalize directive but
        // the model still answers with a report (no answer tag).
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>one more search</plan><report>Best effort so far.</report>",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits(1));
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.prediction, "Best effort so far.");
        assert_eq!(outcome.termination, "finalized without answer tag");
    }

    #[tokio::test]
    async fn missing_action_triggers_forced_finalization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("did not provide a valid response format"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>ok</plan><report>r</report><answer>42</answer>",
            )))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "I forgot the tags entirely and wrote prose.",
            )))
            .with_priority(5)
            .mount(&server)
            .await;

        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits(5));
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.prediction, "42");
        assert_eq!(outcome.termination, "answer (forced)");
    }

    #[tokio::test]
    async fn format_error_when_forced_retry_also_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("still no tags")))
            .mount(&server)
            .await;

        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits(5));
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.termination, "format error");
        assert!(!outcome.prediction.is_empty());
    }

    #[tokio::test]
    async fn token_limit_trips_forced_finalization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("maximum context length"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<answer>condensed</answer>",
            )))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>search</plan><report>lots of words</report><tool_call>{\"name\": \"missing_tool\", \"arguments\": {}}</tool_call>",
            )))
            .with_priority(5)
            .mount(&server)
            .await;

        let mut limits = limits(5);
        limits.max_input_tokens = 10;
        let agent = ResearchAgent::new(llm_for(&server), Arc::new(ToolRegistry::new()), limits);
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.prediction, "condensed");
        assert_eq!(outcome.termination, "token limit reached");
    }

    #[tokio::test]
    async fn empty_tool_result_does_not_hang() {
        struct EmptyTool;
        #[async_trait]
        impl Tool for EmptyTool {
            fn name(&self) -> &str {
                "search"
            }
            fn description(&self) -> &str {
                "search"
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object", "properties": {}})
            }
            async fn execute(&self, _args: Value) -> Result<ToolResult> {
                Ok(ToolResult::success(""))
            }
        }

        let server = MockServer::start().await;
        // Round 2's prompt carries round 1's report, which marks it apart.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("round-one-report"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<report>empty observation seen</report><answer>done</answer>",
            )))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<report>round-one-report</report><tool_call>{\"name\": \"search\", \"arguments\": {}}</tool_call>",
            )))
            .with_priority(5)
            .mount(&server)
            .await;

        let mut registry = ToolRegistry::new();
        registry.register(EmptyTool);
        let agent = ResearchAgent::new(llm_for(&server), Arc::new(registry), limits(5));
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.prediction, "done");
    }

    #[tokio::test]
    async fn native_mode_consumes_native_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("searched observation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("the final answer")))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": "",
                        "tool_calls": [{
                            "id": "c1",
                            "type": "function",
                            "function": {"name": "search", "arguments": "{\"query\": [\"x\"]}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .with_priority(5)
            .mount(&server)
            .await;

        struct ObsTool;
        #[async_trait]
        impl Tool for ObsTool {
            fn name(&self) -> &str {
                "search"
            }
            fn description(&self) -> &str {
                "search"
            }
            fn parameters_schema(&self) -> Value {
                json!({"type": "object", "properties": {}})
            }
            async fn execute(&self, _args: Value) -> Result<ToolResult> {
                Ok(ToolResult::success("searched observation"))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(ObsTool);
        let agent = ResearchAgent::new(llm_for(&server), Arc::new(registry), limits(5))
            .with_call_mode(CallMode::Native);
        let outcome = agent.run("question", &NoOpSink).await;

        assert_eq!(outcome.prediction, "the final answer");
        assert_eq!(outcome.termination, "answer found");
    }
}

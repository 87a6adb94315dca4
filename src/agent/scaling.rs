//! Parallel-sample research with integrative synthesis
//!
//! Phase 1 fans out N iterative agents on the same question, shifting the
//! temperature by 0.2 per sample to diversify exploration. Samples share no
//! mutable state and individual failures are collected, not raised. Phase 2
//! feeds every successful sample's answer and report to one low-temperature
//! synthesis call whose text becomes the final answer.
//!
//! Cost advisory: N parallel samples cost roughly (N + 0.5)x a single run;
//! callers should reserve this mode for high-value questions.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::agent::client::LlmClient;
use crate::agent::events::{AgentEvent, NoOpSink, ProgressSink};
use crate::agent::prompts::SYNTHESIS_SYSTEM_PROMPT;
use crate::agent::researcher::{ResearchAgent, ResearchOutcome};
use crate::agent::types::{GenerationOptions, Message};
use crate::config::{AgentLimits, LlmConfig};
use crate::tools::ToolRegistry;

/// Temperature shift applied per sample index
const TEMPERATURE_STEP: f32 = 0.2;
/// Answer used when no sample produced data to synthesize
const NO_DATA_ANSWER: &str = "Synthesis failed: No research data available.";

/// One parallel sample's outcome
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    /// Sample index, 0-based
    pub index: usize,
    /// Temperature the sample ran at
    pub temperature: f32,
    /// The research result, when the sample completed
    pub result: Option<ResearchOutcome>,
    /// Failure description, when it did not
    pub error: Option<String>,
}

/// Result bundle of a parallel-sample run
#[derive(Debug, Clone)]
pub struct ScalingOutcome {
    pub question: String,
    /// The synthesized final answer; non-empty on every path
    pub final_answer: String,
    /// Per-sample outcomes, failures included
    pub samples: Vec<SampleOutcome>,
}

/// Parallel-sampling agent
pub struct ScalingAgent {
    llm_config: LlmConfig,
    registry: Arc<ToolRegistry>,
    limits: AgentLimits,
    options: GenerationOptions,
    instruction: String,
    num_samples: usize,
}

impl ScalingAgent {
    /// Create a scaling agent; each sample builds its own LLM client.
    pub fn new(
        llm_config: LlmConfig,
        registry: Arc<ToolRegistry>,
        limits: AgentLimits,
        num_samples: usize,
    ) -> Self {
        ScalingAgent {
            llm_config,
            registry,
            limits,
            options: GenerationOptions::default(),
            instruction: String::new(),
            num_samples: num_samples.max(1),
        }
    }

    /// Attach a task-specific instruction
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Override the base generation options
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Advisory cost estimate the caller may print before running.
    pub fn estimate_cost(&self) -> String {
        format!(
            "Parallel sampling cost estimate: {} agents x base cost + ~0.5x for synthesis \
             (~{:.1}x a single-agent run). Use for high-value questions only.",
            self.num_samples,
            self.num_samples as f32 + 0.5
        )
    }

    /// Run all samples, then synthesize.
    pub async fn run(&self, question: &str, sink: &dyn ProgressSink) -> ScalingOutcome {
        info!("{}", self.estimate_cost());
        let samples = self.run_samples(question).await;

        for sample in &samples {
            let status = match (&sample.result, &sample.error) {
                (Some(result), _) => result.termination.clone(),
                (None, Some(error)) => format!("failed: {}", error),
                (None, None) => "failed".to_string(),
            };
            sink.emit(AgentEvent::status(
                format!("sample {} {}", sample.index + 1, status),
                String::new(),
                String::new(),
            ))
            .await;
        }

        let final_answer = self.synthesize(question, &samples).await;
        sink.emit(AgentEvent::final_answer(
            0,
            final_answer.clone(),
            String::new(),
            "synthesized".to_string(),
        ))
        .await;

        ScalingOutcome {
            question: question.to_string(),
            final_answer,
            samples,
        }
    }

    /// Phase 1: independent agents with monotone temperature offsets.
    async fn run_samples(&self, question: &str) -> Vec<SampleOutcome> {
        let mut handles = Vec::new();
        for i in 0..self.num_samples {
            let options = self
                .options
                .clone()
                .with_temperature_offset(TEMPERATURE_STEP * i as f32);
            let temperature = options.temperature;
            let question = question.to_string();
            let registry = self.registry.clone();
            let limits = self.limits.clone();
            let instruction = self.instruction.clone();
            let llm_config = self.llm_config.clone();

            let handle = tokio::spawn(async move {
                let llm = Arc::new(LlmClient::new(llm_config)?);
                let agent = ResearchAgent::new(llm, registry, limits)
                    .with_instruction(instruction)
                    .with_options(options);
                Ok::<ResearchOutcome, crate::Error>(agent.run(&question, &NoOpSink).await)
            });
            handles.push(((i, temperature), handle));
        }

        let (meta, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(tasks).await;

        let mut samples = Vec::new();
        for ((index, temperature), outcome) in meta.into_iter().zip(joined) {
            let (result, error) = match outcome {
                Ok(Ok(outcome)) => {
                    info!("Sample {} finished: {}", index + 1, outcome.termination);
                    (Some(outcome), None)
                }
                Ok(Err(e)) => {
                    warn!("Sample {} failed: {}", index + 1, e);
                    (None, Some(e.to_string()))
                }
                Err(e) => {
                    warn!("Sample {} task failed: {}", index + 1, e);
                    (None, Some(e.to_string()))
                }
            };
            samples.push(SampleOutcome {
                index,
                temperature,
                result,
                error,
            });
        }
        samples
    }

    /// Phase 2: one low-temperature synthesis call over the successes.
    async fn synthesize(&self, question: &str, samples: &[SampleOutcome]) -> String {
        let successes: Vec<(&SampleOutcome, &ResearchOutcome)> = samples
            .iter()
            .filter_map(|s| s.result.as_ref().map(|r| (s, r)))
            .collect();
        if successes.is_empty() {
            warn!("No valid results from parallel research; cannot synthesize");
            return NO_DATA_ANSWER.to_string();
        }

        let mut content = format!(
            "[Original research question]\n{}\n\n[Reports and answers from parallel researchers]\n",
            question
        );
        for (sample, result) in &successes {
            content.push_str(&format!(
                "\n--- Researcher {i} (status: {status}) ---\n\
                 [Researcher {i} answer]\n{answer}\n\
                 [Researcher {i} report]\n{report}\n",
                i = sample.index + 1,
                status = result.termination,
                answer = result.prediction,
                report = result.report,
            ));
        }

        let messages = vec![
            Message::system(SYNTHESIS_SYSTEM_PROMPT),
            Message::user(content),
        ];
        let llm = match LlmClient::new(self.llm_config.clone()) {
            Ok(client) => client,
            Err(e) => {
                warn!("Synthesis client construction failed: {}", e);
                return NO_DATA_ANSWER.to_string();
            }
        };
        // No tools and no stop sequences; fixed low temperature.
        let reply = llm
            .complete(&messages, &GenerationOptions::precise(), &[], None)
            .await;
        reply.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn llm_config(base_url: String) -> LlmConfig {
        LlmConfig {
            api_key: SecretString::from("test-key"),
            base_url,
            model: "test-model".to_string(),
            summary_model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
            thinking_mode: None,
        }
    }

    fn limits() -> AgentLimits {
        AgentLimits {
            max_llm_calls: 3,
            agent_timeout: Duration::from_secs(60),
            max_input_tokens: 100_000,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"content": content}, "finish_reason": "stop"}]})
    }

    #[tokio::test]
    async fn samples_fan_out_and_synthesis_produces_final_answer() {
        let server = MockServer::start().await;
        // Synthesis call carries the researcher bundles.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Researcher 1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("9.58 seconds")))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        // Every sample answers directly in round one.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "<plan>p</plan><report>Bolt holds the record.</report><answer>Usain Bolt, 9.58s</answer>",
            )))
            .with_priority(5)
            .expect(3)
            .mount(&server)
            .await;

        let agent = ScalingAgent::new(
            llm_config(server.uri()),
            Arc::new(ToolRegistry::new()),
            limits(),
            3,
        );
        let outcome = agent.run("who holds the 100m world record?", &NoOpSink).await;

        assert_eq!(outcome.final_answer, "9.58 seconds");
        assert_eq!(outcome.samples.len(), 3);
        assert!(outcome.samples.iter().all(|s| s.result.is_some()));
        // Monotone temperature offsets.
        assert!(outcome.samples[1].temperature > outcome.samples[0].temperature);
        assert!(outcome.samples[2].temperature > outcome.samples[1].temperature);
    }

    #[tokio::test]
    async fn zero_successes_yields_no_data_answer() {
        let server = MockServer::start().await;
        let agent = ScalingAgent::new(
            llm_config(server.uri()),
            Arc::new(ToolRegistry::new()),
            limits(),
            2,
        );
        let answer = agent.synthesize("q", &[]).await;
        assert_eq!(answer, NO_DATA_ANSWER);
    }

    #[test]
    fn cost_estimate_mentions_multiplier() {
        let agent = ScalingAgent::new(
            llm_config("http://localhost".into()),
            Arc::new(ToolRegistry::new()),
            limits(),
            3,
        );
        assert!(agent.estimate_cost().contains("3.5x"));
    }
}

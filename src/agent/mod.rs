//! Agent module - the loop engine and its three variants
//!
//! This module holds everything between a question and a final answer:
//! - OpenAI-compatible LLM client with retry/backoff and stop sequences
//! - Structured-output parsing of the tagged block protocol
//! - The iterative single-report loop (plan/report/act per round)
//! - The planner/writer dual loop over a shared memory bank
//! - The parallel-sample loop with integrative synthesis
//! - Progress events consumed by the session layer

pub mod client;
pub mod events;
pub mod output;
pub mod prompts;
pub mod researcher;
pub mod scaling;
pub mod types;
pub mod weaver;
pub mod workspace;

pub use client::{LlmClient, LlmReply, LLM_FAILURE_SENTINEL, OBS_END, OBS_START};
pub use events::{AgentEvent, EventKind, NoOpSink, ProgressSink};
pub use output::{parse_planner, parse_round, parse_writer, ActionOutput, AgentAction, RoundOutput};
pub use researcher::{CallMode, ResearchAgent, ResearchOutcome};
pub use scaling::{SampleOutcome, ScalingAgent, ScalingOutcome};
pub use types::{GenerationOptions, Message, Role};
pub use weaver::{WeaverAgent, WeaverOutcome};
pub use workspace::Workspace;

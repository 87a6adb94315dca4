//! # WebResearcher
//!
//! A deep-research agent runtime: given a natural-language question, it
//! drives an LLM through an iterative loop of planning, tool invocation, and
//! synthesis until it can emit a final answer or structured report.
//!
//! ## Architecture
//!
//! - **Agent** (`agent`): the loop engine, holding the LLM client, the
//!   structured-output parser, and the three loop variants (iterative
//!   researcher, planner/writer over a citation memory bank, parallel
//!   sampling with synthesis)
//! - **Tools** (`tools`): the capability registry and dispatcher, the memory
//!   bank, and the built-in tools (search, scholar, visit, python,
//!   parse_file, retrieve)
//! - **Session** (`session`): multi-turn sessions, per-turn event streams,
//!   and append-only JSONL persistence
//! - **Server** (`server`): the axum API with SSE progress streaming
//! - **Configuration** (`config`): env-driven config injected at construction
//!
//! ## Design Principles
//!
//! 1. **Degrade, never abort**: LLM failures become sentinel strings and tool
//!    failures become error observations; the loop always produces a
//!    non-empty prediction
//! 2. **Minimal carried state**: each round sees the question, the evolving
//!    report, and the last observation, nothing else
//! 3. **Trait-based tools**: capabilities implement one `Tool` trait and
//!    register before the loop starts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webresearcher::agent::{LlmClient, NoOpSink, ResearchAgent};
//! use webresearcher::config::Config;
//! use webresearcher::tools::default_registry;
//!
//! #[tokio::main]
//! async fn main() -> webresearcher::Result<()> {
//!     let config = Config::from_env()?;
//!     let llm = Arc::new(LlmClient::new(config.llm.clone())?);
//!     let registry = Arc::new(default_registry(&config, llm.clone()));
//!     let agent = ResearchAgent::new(llm, registry, config.limits.clone());
//!     let outcome = agent.run("capital of France?", &NoOpSink).await;
//!     println!("{}", outcome.prediction);
//!     Ok(())
//! }
//! ```

// Agent loops and LLM interaction
pub mod agent;

// Env-driven configuration
pub mod config;

// Error types
pub mod error;

// HTTP surface
pub mod server;

// Session orchestration and persistence
pub mod session;

// Tool registry, dispatcher, and built-in tools
pub mod tools;

// Re-export commonly used items
pub use error::{Error, Result};

pub use agent::{
    AgentEvent, CallMode, LlmClient, NoOpSink, ProgressSink, ResearchAgent, ResearchOutcome,
    ScalingAgent, ScalingOutcome, WeaverAgent, WeaverOutcome,
};
pub use config::Config;
pub use session::{AgentKind, Session, SessionManager, SessionOptions};
pub use tools::{MemoryBank, Tool, ToolRegistry};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

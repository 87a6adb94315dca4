//! WebResearcher CLI - run one research question from the terminal.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use webresearcher::agent::{LlmClient, NoOpSink, ResearchAgent, ScalingAgent, WeaverAgent};
use webresearcher::config::Config;
use webresearcher::session::AgentKind;
use webresearcher::tools::default_registry;

#[derive(Parser)]
#[command(name = "webresearcher", about = "Deep-research agent runtime", version)]
struct Args {
    /// The research question
    question: String,

    /// Loop variant: researcher | weaver | scaling
    #[arg(long, default_value = "researcher")]
    agent: String,

    /// Parallel sample count (scaling agent only)
    #[arg(long, default_value = "3")]
    samples: usize,

    /// Optional task-specific instruction
    #[arg(long, default_value = "")]
    instruction: String,

    /// Comma-separated tool whitelist (default: all tools)
    #[arg(long)]
    tools: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let agent_kind: AgentKind = args.agent.parse()?;

    let llm = Arc::new(LlmClient::new(config.llm.clone())?);
    let mut registry = default_registry(&config, llm.clone());
    if let Some(ref tools) = args.tools {
        let names: Vec<String> = tools.split(',').map(|s| s.trim().to_string()).collect();
        registry = registry.subset(&names);
    }
    let registry = Arc::new(registry);

    let output = match agent_kind {
        AgentKind::Researcher => {
            let agent = ResearchAgent::new(llm, registry, config.limits.clone())
                .with_instruction(&args.instruction);
            let outcome = agent.run(&args.question, &NoOpSink).await;
            serde_json::json!({
                "question": outcome.question,
                "prediction": outcome.prediction,
                "report": outcome.report,
                "termination": outcome.termination,
            })
        }
        AgentKind::Weaver => {
            let agent = WeaverAgent::new(llm, registry, config.limits.clone())
                .with_instruction(&args.instruction);
            let outcome = agent.run(&args.question, &NoOpSink).await;
            serde_json::json!({
                "question": outcome.question,
                "final_outline": outcome.final_outline,
                "final_report": outcome.final_report,
                "memory_bank_size": outcome.memory_bank_size,
                "total_time_seconds": outcome.elapsed.as_secs_f64(),
                "error": outcome.error,
            })
        }
        AgentKind::Scaling => {
            let agent = ScalingAgent::new(
                config.llm.clone(),
                registry,
                config.limits.clone(),
                args.samples.clamp(2, 8),
            )
            .with_instruction(&args.instruction);
            eprintln!("{}", agent.estimate_cost());
            let outcome = agent.run(&args.question, &NoOpSink).await;
            serde_json::json!({
                "question": outcome.question,
                "final_synthesized_answer": outcome.final_answer,
                "samples": outcome.samples.iter().map(|s| serde_json::json!({
                    "agent": s.index + 1,
                    "temperature": s.temperature,
                    "termination": s.result.as_ref().map(|r| r.termination.clone()),
                    "error": s.error,
                })).collect::<Vec<_>>(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

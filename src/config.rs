//! Configuration management for WebResearcher
//!
//! All knobs are read from environment variables once at startup and carried
//! in a plain `Config` struct injected at construction; there are no implicit
//! singletons.

use crate::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Read an env var with a parsed fallback.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// LLM endpoint configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key for the chat-completion endpoint
    pub api_key: SecretString,
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Main agent model
    pub model: String,
    /// Model used by the visit tool's page summarizer
    pub summary_model: String,
    /// Per-call timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient API errors
    pub max_retries: u32,
    /// Optional thinking-mode selector passed through `extra_body`
    pub thinking_mode: Option<String>,
}

impl LlmConfig {
    /// Build from `LLM_API_KEY`, `LLM_BASE_URL`, `LLM_MODEL_NAME`,
    /// `SUMMARY_MODEL_NAME`, `LLM_TIMEOUT`, `LLM_MAX_RETRIES`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| Error::Config("LLM_API_KEY is not set".to_string()))?;
        let model = std::env::var("LLM_MODEL_NAME")
            .map_err(|_| Error::Config("LLM_MODEL_NAME is not set".to_string()))?;
        let summary_model = std::env::var("SUMMARY_MODEL_NAME").unwrap_or_else(|_| model.clone());

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model,
            summary_model,
            timeout: Duration::from_secs(env_parse("LLM_TIMEOUT", 300)),
            max_retries: env_parse("LLM_MAX_RETRIES", 5),
            thinking_mode: std::env::var("LLM_THINKING_MODE").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// Per-run agent-loop limits
#[derive(Debug, Clone)]
pub struct AgentLimits {
    /// Maximum LLM round-trips per loop invocation (`R_max`)
    pub max_llm_calls: u32,
    /// Overall wall-clock deadline for one loop invocation
    pub agent_timeout: Duration,
    /// Input token limit; exceeding it trips forced finalization
    pub max_input_tokens: usize,
}

impl AgentLimits {
    /// Build from `MAX_LLM_CALL_PER_RUN`, `AGENT_TIMEOUT`, `MAX_INPUT_TOKENS`.
    pub fn from_env() -> Self {
        Self {
            max_llm_calls: env_parse("MAX_LLM_CALL_PER_RUN", 20),
            agent_timeout: Duration::from_secs(env_parse("AGENT_TIMEOUT", 600)),
            max_input_tokens: env_parse("MAX_INPUT_TOKENS", 32_000),
        }
    }
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_llm_calls: 20,
            agent_timeout: Duration::from_secs(600),
            max_input_tokens: 32_000,
        }
    }
}

/// Search provider configuration (web search + scholar)
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    /// Serper API key; `None` disables live search
    pub serper_api_key: Option<SecretString>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl SearchConfig {
    /// Build from `SERPER_API_KEY` and `SEARCH_TIMEOUT`.
    pub fn from_env() -> Self {
        Self {
            serper_api_key: std::env::var("SERPER_API_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            timeout_secs: env_parse("SEARCH_TIMEOUT", 30),
        }
    }
}

/// Code-sandbox endpoints for the python tool
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    /// Candidate sandbox base URLs; one is chosen at random per attempt
    pub endpoints: Vec<String>,
    /// Per-execution timeout in seconds
    pub run_timeout_secs: u64,
}

impl SandboxConfig {
    /// Build from comma-separated `SANDBOX_ENDPOINTS` and `SANDBOX_TIMEOUT`.
    pub fn from_env() -> Self {
        let endpoints = std::env::var("SANDBOX_ENDPOINTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            endpoints,
            run_timeout_secs: env_parse("SANDBOX_TIMEOUT", 10),
        }
    }
}

/// File-parsing tool configuration
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Root directory user files are resolved against
    pub root: PathBuf,
    /// Per-file content cap in bytes
    pub max_bytes: usize,
}

impl FileConfig {
    /// Build from `FILE_DIR` and `FILE_MAX_BYTES`.
    pub fn from_env() -> Self {
        Self {
            root: PathBuf::from(std::env::var("FILE_DIR").unwrap_or_else(|_| "./uploads".into())),
            max_bytes: env_parse("FILE_MAX_BYTES", 256_000),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            max_bytes: 256_000,
        }
    }
}

/// Complete process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub limits: AgentLimits,
    pub search: SearchConfig,
    pub sandbox: SandboxConfig,
    pub files: FileConfig,
    /// Append-only JSONL session history file
    pub history_path: PathBuf,
}

impl Config {
    /// Load the full configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            llm: LlmConfig::from_env()?,
            limits: AgentLimits::from_env(),
            search: SearchConfig::from_env(),
            sandbox: SandboxConfig::from_env(),
            files: FileConfig::from_env(),
            history_path: PathBuf::from(
                std::env::var("HISTORY_FILE").unwrap_or_else(|_| "./data/history.jsonl".into()),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_limits_defaults() {
        let limits = AgentLimits::default();
        assert_eq!(limits.max_llm_calls, 20);
        assert_eq!(limits.max_input_tokens, 32_000);
        assert_eq!(limits.agent_timeout, Duration::from_secs(600));
    }

    #[test]
    fn env_parse_falls_back() {
        assert_eq!(env_parse("DEFINITELY_NOT_SET_12345", 7u32), 7);
    }
}

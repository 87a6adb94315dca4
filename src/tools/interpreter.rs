//! Sandboxed code execution tool
//!
//! Runs Python snippets against an external code-sandbox service. One of the
//! configured endpoints is chosen at random per attempt, with two attempts
//! per call. Without configured endpoints the tool reports itself
//! unavailable; code is never executed in-process.

use async_trait::async_trait;
use rand::prelude::IndexedRandom;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};

use super::traits::{Tool, ToolResult};

#[derive(Debug, Deserialize, Default)]
struct RunResult {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

#[derive(Debug, Deserialize)]
struct RunCodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    run_result: Option<RunResult>,
}

/// Python interpreter tool backed by a sandbox service
pub struct CodeInterpreterTool {
    client: Client,
    config: SandboxConfig,
}

impl CodeInterpreterTool {
    /// Create an interpreter tool
    pub fn new(config: SandboxConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.run_timeout_secs + 20))
            .build()
            .expect("Failed to create HTTP client");
        CodeInterpreterTool { client, config }
    }

    async fn run_code(&self, code: &str) -> Result<String> {
        let mut last_err = None;
        for attempt in 0..2 {
            let endpoint = self
                .config
                .endpoints
                .choose(&mut rand::rng())
                .ok_or_else(|| Error::Config("no sandbox endpoints configured".to_string()))?;
            debug!("Attempt {}/2 using sandbox endpoint: {}", attempt + 1, endpoint);

            let response = self
                .client
                .post(format!("{}/run_code", endpoint.trim_end_matches('/')))
                .json(&serde_json::json!({
                    "code": code,
                    "language": "python",
                    "run_timeout": self.config.run_timeout_secs,
                }))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: RunCodeResponse = resp.json().await?;
                    return Ok(format_run_output(&body));
                }
                Ok(resp) => {
                    last_err = Some(Error::Tool(format!(
                        "sandbox returned status {}",
                        resp.status()
                    )));
                }
                Err(e) => {
                    warn!("Sandbox attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.into());
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Tool("sandbox execution failed".to_string())))
    }
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn name(&self) -> &str {
        "python"
    }

    fn description(&self) -> &str {
        "Execute Python code in a sandboxed environment. Put the code inside <code> and </code> tags immediately after an empty 'arguments' object. Any output you want to see MUST be printed with print()."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let raw = args.get("code").and_then(|v| v.as_str()).unwrap_or_default();
        let code = strip_code_fences(raw);
        if code.trim().is_empty() {
            return Ok(ToolResult::failure("[Python Interpreter Error]: Empty code."));
        }
        if self.config.endpoints.is_empty() {
            return Ok(ToolResult::failure(
                "No sandbox endpoints configured; python execution is unavailable.",
            ));
        }
        match self.run_code(&code).await {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(e) => Ok(ToolResult::failure(format!("[Python Interpreter Error]: {}", e))),
        }
    }
}

/// Unwrap a ``` fenced block when the model wrapped its code in one.
fn strip_code_fences(code: &str) -> String {
    let re = Regex::new(r"(?s)```[^\n]*\n(.+?)```").expect("valid fence pattern");
    match re.captures(code) {
        Some(caps) => caps[1].to_string(),
        None => code.to_string(),
    }
}

fn format_run_output(response: &RunCodeResponse) -> String {
    let run = response.run_result.as_ref();
    let stdout = run.map(|r| r.stdout.trim()).unwrap_or_default();
    let stderr = run.map(|r| r.stderr.trim()).unwrap_or_default();

    let mut parts = Vec::new();
    if !stdout.is_empty() {
        parts.push(format!("stdout:\n{}", stdout));
    }
    if !stderr.is_empty() {
        parts.push(format!("stderr:\n{}", stderr));
    }
    if parts.is_empty() {
        if response.status.is_empty() {
            "Finished execution.".to_string()
        } else {
            format!("Finished execution with status: {}", response.status)
        }
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let tool = CodeInterpreterTool::new(SandboxConfig::default());
        let result = tool.execute(serde_json::json!({"code": "  "})).await.unwrap();
        assert!(result.into_text().contains("Empty code"));
    }

    #[tokio::test]
    async fn unconfigured_sandbox_reports_unavailable() {
        let tool = CodeInterpreterTool::new(SandboxConfig::default());
        let result = tool
            .execute(serde_json::json!({"code": "print(1)"}))
            .await
            .unwrap();
        assert!(result.into_text().contains("unavailable"));
    }

    #[test]
    fn strips_fenced_code() {
        let fenced = "```python\nprint(1)\n```";
        assert_eq!(strip_code_fences(fenced), "print(1)\n");
        assert_eq!(strip_code_fences("print(2)"), "print(2)");
    }

    #[tokio::test]
    async fn formats_stdout_from_sandbox() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Success",
                "run_result": {"stdout": "2\n", "stderr": ""}
            })))
            .mount(&server)
            .await;

        let tool = CodeInterpreterTool::new(SandboxConfig {
            endpoints: vec![server.uri()],
            run_timeout_secs: 10,
        });
        let result = tool
            .execute(serde_json::json!({"code": "print(1+1)"}))
            .await
            .unwrap();
        assert_eq!(result.into_text(), "stdout:\n2");
    }
}

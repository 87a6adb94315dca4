//! Page visit tool
//!
//! Fetches webpage(s), extracts readable text, and condenses it against the
//! caller's stated goal with one summarizer LLM call per page. The LLM step
//! returns a `{rational, evidence, summary}` JSON object; brace extraction is
//! best-effort and a non-JSON reply is used verbatim as the summary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::client::LlmClient;
use crate::agent::prompts::extractor_prompt;
use crate::agent::types::{GenerationOptions, Message};
use crate::error::{Error, Result};

use super::search::SECTION_SEPARATOR;
use super::traits::{Tool, ToolResult};

/// Cap on raw HTML downloaded per page
const MAX_DOWNLOAD_BYTES: usize = 512_000;
/// Cap on extracted text handed to the summarizer
const MAX_PAGE_CHARS: usize = 100_000;
/// Wall-clock budget across a batch of URLs
const BATCH_DEADLINE: Duration = Duration::from_secs(900);
/// Canned evidence line for unreachable pages
const UNREACHABLE_EVIDENCE: &str =
    "The provided webpage content could not be accessed. Please check the URL or file format.";
/// Canned summary line for unreachable pages
const UNREACHABLE_SUMMARY: &str =
    "The webpage content could not be processed, and therefore, no information is available.";

/// Webpage visit-and-summarize tool
pub struct VisitTool {
    client: Client,
    llm: Arc<LlmClient>,
}

impl VisitTool {
    /// Create a visit tool; `llm` runs the per-page extraction call.
    pub fn new(llm: Arc<LlmClient>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) webresearcher/0.1")
            .build()
            .expect("Failed to create HTTP client");
        VisitTool { client, llm }
    }

    async fn read_page(&self, url: &str, goal: &str) -> String {
        let (evidence, summary) = match self.fetch_and_summarize(url, goal).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Visit failed for {}: {}", url, e);
                (UNREACHABLE_EVIDENCE.to_string(), UNREACHABLE_SUMMARY.to_string())
            }
        };
        format!(
            "The useful information in {url} for user goal {goal} as follows: \n\n\
             Evidence in page: \n{evidence}\n\n\
             Summary: \n{summary}\n",
        )
    }

    async fn fetch_and_summarize(&self, url: &str, goal: &str) -> Result<(String, String)> {
        let target = url::Url::parse(url)
            .map_err(|e| Error::InvalidInput(format!("invalid URL '{}': {}", url, e)))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "unsupported URL scheme '{}'",
                target.scheme()
            )));
        }

        let response = self.client.get(target).send().await?;
        if !response.status().is_success() {
            return Err(Error::Tool(format!("HTTP {}", response.status())));
        }

        let mut body = response.text().await?;
        if body.len() > MAX_DOWNLOAD_BYTES {
            body.truncate(floor_char_boundary(&body, MAX_DOWNLOAD_BYTES));
        }

        // scraper's DOM is !Send; extraction runs on the blocking pool and
        // only the plain text crosses back.
        let text = tokio::task::spawn_blocking(move || extract_readable_text(&body))
            .await
            .map_err(|e| Error::Internal(format!("extraction task failed: {}", e)))?;

        if text.trim().is_empty() {
            return Err(Error::Tool("no extractable content".to_string()));
        }
        let text = truncate_chars(&text, MAX_PAGE_CHARS);

        let prompt = extractor_prompt(&text, goal);
        let reply = self
            .llm
            .complete_with_model(
                self.llm.summary_model(),
                &[Message::user(prompt)],
                &GenerationOptions {
                    temperature: 0.7,
                    presence_penalty: None,
                    ..Default::default()
                },
                &[],
                None,
            )
            .await;

        if reply.is_failure() {
            return Err(Error::Llm("summarizer call failed".to_string()));
        }
        Ok(parse_extraction(&reply.content))
    }
}

#[async_trait]
impl Tool for VisitTool {
    fn name(&self) -> &str {
        "visit"
    }

    fn description(&self) -> &str {
        "Visit webpage(s) and return the summary of the content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": ["string", "array"],
                    "items": {"type": "string"},
                    "minItems": 1,
                    "description": "The URL(s) of the webpage(s) to visit. Can be a single URL or an array of URLs."
                },
                "goal": {
                    "type": "string",
                    "description": "The specific information goal for visiting webpage(s)."
                }
            },
            "required": ["url", "goal"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let urls: Vec<String> = match args.get("url") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(a)) => a
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => vec![],
        };
        let goal = args.get("goal").and_then(|v| v.as_str()).unwrap_or_default();
        if urls.is_empty() || goal.is_empty() {
            return Ok(ToolResult::failure(
                "Invalid request format: Input must be a JSON object containing 'url' and 'goal' fields",
            ));
        }

        let started = Instant::now();
        let mut sections = Vec::new();
        for url in &urls {
            if started.elapsed() > BATCH_DEADLINE {
                sections.push(format!(
                    "The useful information in {url} for user goal {goal} as follows: \n\n\
                     Evidence in page: \n{UNREACHABLE_EVIDENCE}\n\n\
                     Summary: \n{UNREACHABLE_SUMMARY}\n",
                ));
                continue;
            }
            debug!("Visiting {}", url);
            sections.push(self.read_page(url, goal).await);
        }
        Ok(ToolResult::success(
            sections.join(SECTION_SEPARATOR).trim().to_string(),
        ))
    }
}

/// Strip scripts/styles/chrome and return the page's readable text.
fn extract_readable_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    // Prefer focused content regions before falling back to the whole body.
    for sel_str in ["article", "main", "[role=\"main\"]", "#mw-content-text"] {
        if let Ok(sel) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&sel).next() {
                let text = collect_text(el.text());
                if text.len() >= 200 {
                    return text;
                }
            }
        }
    }

    if let Ok(sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&sel).next() {
            return collect_text(body.text());
        }
    }
    String::new()
}

fn collect_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<String> = parts
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    lines.join("\n")
}

/// Best-effort parse of the extractor's JSON reply into (evidence, summary).
fn parse_extraction(content: &str) -> (String, String) {
    let candidate = match (content.find('{'), content.rfind('}')) {
        (Some(left), Some(right)) if left < right => &content[left..=right],
        _ => content,
    };
    match json5::from_str::<Value>(candidate) {
        Ok(value) => {
            let evidence = value
                .get("evidence")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let summary = value
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or(content)
                .to_string();
            (evidence, summary)
        }
        Err(_) => (String::new(), content.to_string()),
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = max.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

//! Google Scholar search tool
//!
//! Same batched-query contract as the web search tool (array of queries,
//! sections joined with `=======`), but against Serper's scholar endpoint,
//! whose payload carries academic fields the web index does not: publication
//! info, year, citation count, and a direct PDF link when one exists.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::{Error, Result};

use super::search::{query_list, SECTION_SEPARATOR};
use super::traits::{Tool, ToolResult};

const SERPER_BASE_URL: &str = "https://google.serper.dev";

/// One organic result from the scholar endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScholarResult {
    #[serde(default)]
    pub title: Option<String>,
    /// Number in some payloads, string in others
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub publication_info: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub cited_by: Option<Value>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScholarResponse {
    #[serde(default)]
    pub organic: Vec<ScholarResult>,
}

/// Render a year/citedBy value that may arrive as number or string.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format one result: numbered title line linking the PDF when available,
/// then publication/year/citation lines and the cleaned snippet.
fn format_scholar_item(result: &ScholarResult, idx: usize) -> String {
    let title = result.title.as_deref().unwrap_or("No title");
    let link = result
        .pdf_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or("no available link");

    let mut parts = vec![format!("{}. [{}]({})", idx, title, link)];
    if let Some(publication) = result.publication_info.as_deref().filter(|p| !p.is_empty()) {
        parts.push(format!("Publication: {}", publication));
    }
    if let Some(year) = result.year.as_ref().filter(|y| !y.is_null()) {
        parts.push(format!("Year: {}", scalar_text(year)));
    }
    if let Some(cited_by) = result.cited_by.as_ref().filter(|c| !c.is_null()) {
        parts.push(format!("Cited by: {}", scalar_text(cited_by)));
    }
    if let Some(snippet) = result.snippet.as_deref() {
        let clean = snippet
            .replace("Your browser can't play this video.", "")
            .trim()
            .to_string();
        if !clean.is_empty() {
            parts.push(clean);
        }
    }
    parts.join("\n")
}

/// Format one query's scholar results.
pub(crate) fn format_scholar_results(query: &str, results: &[ScholarResult]) -> String {
    if results.is_empty() {
        return format!(
            "No results found for query: '{}'. Try using a more general query.",
            query
        );
    }
    let formatted: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| format_scholar_item(r, i + 1))
        .collect();
    format!(
        "Google Scholar search for '{}' found {} results:\n\n## Scholar Results\n{}",
        query,
        formatted.len(),
        formatted.join("\n\n")
    )
}

/// Academic search tool backed by Serper's scholar endpoint
pub struct ScholarTool {
    client: Client,
    config: SearchConfig,
    base_url: String,
}

impl ScholarTool {
    /// Create a scholar tool
    pub fn new(config: SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .expect("Failed to create HTTP client");
        ScholarTool {
            client,
            config,
            base_url: SERPER_BASE_URL.to_string(),
        }
    }

    /// Override the provider endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_one(&self, query: &str) -> Result<String> {
        let api_key = self
            .config
            .serper_api_key
            .as_ref()
            .ok_or_else(|| Error::Config("SERPER_API_KEY is not configured".to_string()))?;

        let url = format!("{}/scholar", self.base_url);
        let mut last_err = None;
        for attempt in 0..3 {
            let response = self
                .client
                .post(&url)
                .header("X-API-KEY", api_key.expose_secret())
                .json(&serde_json::json!({ "q": query }))
                .send()
                .await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: ScholarResponse = resp.json().await?;
                    return Ok(format_scholar_results(query, &body.organic));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    warn!(
                        "Scholar attempt {} returned status {} for '{}'",
                        attempt + 1,
                        status,
                        query
                    );
                    last_err = Some(Error::Tool(format!(
                        "scholar search failed with status {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    warn!("Scholar attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.into());
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Tool("scholar search failed".to_string())))
    }
}

#[async_trait]
impl Tool for ScholarTool {
    fn name(&self) -> &str {
        "google_scholar"
    }

    fn description(&self) -> &str {
        "Leverage Google Scholar to retrieve relevant information from academic publications. Accepts multiple queries. max 5 queries."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1,
                    "description": "The list of search queries for Google Scholar. max 5 queries."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let queries = match query_list(&args) {
            Ok(q) => q,
            Err(e) => return Ok(ToolResult::failure(e.to_string())),
        };
        debug!("Scholar search for: {:?}", queries);

        let mut sections = Vec::new();
        for query in &queries {
            match self.search_one(query).await {
                Ok(section) => sections.push(section),
                Err(e) => {
                    warn!("Scholar search failed for '{}': {}", query, e);
                    sections.push(format!(
                        "Google Scholar search failed for query: '{}'. Please try again later.",
                        query
                    ));
                }
            }
        }
        Ok(ToolResult::success(sections.join(SECTION_SEPARATOR)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_key() -> SearchConfig {
        SearchConfig {
            serper_api_key: Some(SecretString::from("k")),
            timeout_secs: 5,
        }
    }

    #[test]
    fn formats_scholar_fields_and_header() {
        let results = vec![ScholarResult {
            title: Some("Attention Is All You Need".into()),
            year: Some(json!(2017)),
            publication_info: Some("A Vaswani, N Shazeer - NeurIPS".into()),
            snippet: Some("We propose the Transformer.".into()),
            cited_by: Some(json!(99999)),
            pdf_url: Some("https://arxiv.org/pdf/1706.03762".into()),
        }];
        let text = format_scholar_results("transformers", &results);

        assert!(text.starts_with("Google Scholar search for 'transformers' found 1 results:"));
        assert!(text.contains("## Scholar Results"));
        assert!(text.contains("1. [Attention Is All You Need](https://arxiv.org/pdf/1706.03762)"));
        assert!(text.contains("Publication: A Vaswani, N Shazeer - NeurIPS"));
        assert!(text.contains("Year: 2017"));
        assert!(text.contains("Cited by: 99999"));
        assert!(text.contains("We propose the Transformer."));
    }

    #[test]
    fn missing_pdf_and_empty_results() {
        let results = vec![ScholarResult {
            title: Some("Paywalled paper".into()),
            year: Some(json!("2020")),
            publication_info: None,
            snippet: None,
            cited_by: None,
            pdf_url: None,
        }];
        let text = format_scholar_results("q", &results);
        assert!(text.contains("1. [Paywalled paper](no available link)"));
        assert!(text.contains("Year: 2020"));
        assert!(!text.contains("Cited by:"));
        assert!(!text.contains("Publication:"));

        let empty = format_scholar_results("rare topic", &[]);
        assert!(empty.contains("No results found for query: 'rare topic'"));
    }

    #[tokio::test]
    async fn parses_scholar_shaped_payload_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scholar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [{
                    "title": "Deep Residual Learning",
                    "link": "https://scholar.google.com/abc",
                    "publicationInfo": "K He, X Zhang - CVPR",
                    "snippet": "Residual networks ease training.",
                    "year": 2016,
                    "citedBy": 150000,
                    "pdfUrl": "https://arxiv.org/pdf/1512.03385"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ScholarTool::new(config_with_key()).with_base_url(server.uri());
        let result = tool
            .execute(json!({"query": ["resnet"]}))
            .await
            .unwrap();
        let text = result.into_text();

        assert!(text.contains("Google Scholar search for 'resnet' found 1 results:"));
        assert!(text.contains("## Scholar Results"));
        assert!(text.contains("1. [Deep Residual Learning](https://arxiv.org/pdf/1512.03385)"));
        assert!(text.contains("Publication: K He, X Zhang - CVPR"));
        assert!(text.contains("Year: 2016"));
        assert!(text.contains("Cited by: 150000"));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let server = MockServer::start().await;
        // The failing mock expires after two hits; the third attempt falls
        // through to the success mock.
        Mock::given(method("POST"))
            .and(path("/scholar"))
            .respond_with(ResponseTemplate::new(500).set_body_string("flaky"))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/scholar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [{"title": "Recovered", "pdfUrl": "https://x/p.pdf"}]
            })))
            .with_priority(5)
            .mount(&server)
            .await;

        let tool = ScholarTool::new(config_with_key()).with_base_url(server.uri());
        let result = tool
            .execute(json!({"query": ["q"]}))
            .await
            .unwrap();
        assert!(result.into_text().contains("1. [Recovered](https://x/p.pdf)"));
    }
}

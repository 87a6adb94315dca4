//! Web search tool
//!
//! Batched Google search through the Serper API. Queries containing CJK text
//! are localized to the Chinese index, everything else to the US index.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::{Error, Result};

use super::traits::{Tool, ToolResult};
use super::contains_cjk;

/// Default Serper endpoint
const SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Maximum queries accepted per call
pub(crate) const MAX_QUERIES: usize = 5;

/// Separator between per-query result sections
pub(crate) const SECTION_SEPARATOR: &str = "\n=======\n";

/// One organic result from Serper
#[derive(Debug, Deserialize)]
pub(crate) struct OrganicResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SerperResponse {
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
}

/// Format one query's results the way the agents expect them.
pub(crate) fn format_results(query: &str, results: &[OrganicResult]) -> String {
    if results.is_empty() {
        return format!("No results found for '{}'. Try with a more general query.", query);
    }
    let snippets: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let date = r
                .date
                .as_deref()
                .map(|d| format!("\nDate published: {}", d))
                .unwrap_or_default();
            let source = r
                .source
                .as_deref()
                .map(|s| format!("\nSource: {}", s))
                .unwrap_or_default();
            let entry = format!("{}. [{}]({}){}{}\n{}", i + 1, r.title, r.link, date, source, r.snippet);
            entry.replace("Your browser can't play this video.", "")
        })
        .collect();
    format!(
        "A Google search for '{}' found {} results:\n\n## Web Results\n{}",
        query,
        snippets.len(),
        snippets.join("\n\n")
    )
}

/// Serper request body with CJK-aware localization.
pub(crate) fn localized_body(query: &str) -> Value {
    if contains_cjk(query) {
        serde_json::json!({"q": query, "location": "China", "gl": "cn", "hl": "zh-cn"})
    } else {
        serde_json::json!({"q": query, "location": "United States", "gl": "us", "hl": "en"})
    }
}

/// Extract the query list from tool arguments (post-normalization).
pub(crate) fn query_list(args: &Value) -> Result<Vec<String>> {
    let queries: Vec<String> = match args.get("query") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(a)) => a
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => vec![],
    };
    if queries.is_empty() {
        return Err(Error::InvalidInput(
            "'query' is required and must be a string or array of strings".to_string(),
        ));
    }
    Ok(queries.into_iter().take(MAX_QUERIES).collect())
}

/// Web search tool backed by Serper
pub struct SearchTool {
    client: Client,
    config: SearchConfig,
    base_url: String,
}

impl SearchTool {
    /// Create a search tool
    pub fn new(config: SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .expect("Failed to create HTTP client");
        SearchTool {
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

        let url = format!("{}/search", self.base_url);
        let mut last_err = None;
        for attempt in 0..2 {
            let response = self
                .client
                .post(&url)
                .header("X-API-KEY", api_key.expose_secret())
                .json(&localized_body(query))
                .send()
                .await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    let body: SerperResponse = resp.json().await?;
                    return Ok(format_results(query, &body.organic));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    last_err = Some(Error::Tool(format!(
                        "search failed with status {}: {}",
                        status, text
                    )));
                }
                Err(e) => {
                    warn!("Search attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.into());
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Tool("search failed".to_string())))
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Performs batched web searches: supply an array 'query'; the tool retrieves the top results for each query in one call. max 5 queries."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "array",
                    "items": {"type": "string"},
                    "minItems": 1,
                    "description": "Array of query strings. Include multiple complementary search queries in a single call. max 5 queries."
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
        debug!("Searching for: {:?}", queries);

        let mut sections = Vec::new();
        for query in &queries {
            match self.search_one(query).await {
                Ok(section) => sections.push(section),
                Err(e) => sections.push(format!("Search failed for '{}': {}", query, e)),
            }
        }
        Ok(ToolResult::success(sections.join(SECTION_SEPARATOR)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_key() -> SearchConfig {
        SearchConfig {
            serper_api_key: Some(SecretString::from("test-key")),
            timeout_secs: 5,
        }
    }

    #[test]
    fn formats_numbered_markdown_entries() {
        let results = vec![OrganicResult {
            title: "Rust".into(),
            link: "https://rust-lang.org".into(),
            snippet: "A language".into(),
            date: Some("2024-01-01".into()),
            source: Some("rust-lang".into()),
        }];
        let text = format_results("rust", &results);
        assert!(text.contains("1. [Rust](https://rust-lang.org)"));
        assert!(text.contains("Date published: 2024-01-01"));
        assert!(text.contains("## Web Results"));
    }

    #[test]
    fn cjk_queries_localize_to_cn() {
        assert_eq!(localized_body("北京是什么?")["gl"], "cn");
        assert_eq!(localized_body("what is rust")["gl"], "us");
    }

    #[test]
    fn query_list_caps_at_five() {
        let args = serde_json::json!({"query": ["a", "b", "c", "d", "e", "f"]});
        assert_eq!(query_list(&args).unwrap().len(), 5);
        assert!(query_list(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_tool_failure() {
        let tool = SearchTool::new(SearchConfig::default());
        let result = tool
            .execute(serde_json::json!({"query": ["x"]}))
            .await
            .unwrap();
        let text = result.into_text();
        assert!(text.contains("SERPER_API_KEY"));
    }

    #[tokio::test]
    async fn searches_each_query_and_joins_sections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organic": [{"title": "T", "link": "http://t", "snippet": "S"}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tool = SearchTool::new(config_with_key()).with_base_url(server.uri());
        let result = tool
            .execute(serde_json::json!({"query": ["one", "two"]}))
            .await
            .unwrap();
        let text = result.into_text();
        assert!(text.contains(SECTION_SEPARATOR.trim()));
        assert!(text.contains("A Google search for 'one'"));
        assert!(text.contains("A Google search for 'two'"));
    }
}

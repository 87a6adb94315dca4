//! Evidence-collecting tool wrapper for the planner
//!
//! Wraps a base tool so that its textual output is split into evidence
//! chunks, each appended to the shared memory bank and acknowledged back to
//! the planner as citation IDs plus summaries. Chunking understands the
//! numbered search-result format; anything unparseable becomes one chunk.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

use super::memory::MemoryBank;
use super::search::SECTION_SEPARATOR;
use super::traits::{Tool, ToolResult};

/// Cap on per-chunk summaries shown to the planner
const SUMMARY_CHARS: usize = 200;
/// Cap on the fallback whole-output summary
const FALLBACK_SUMMARY_CHARS: usize = 300;

/// A base tool wrapped with memory-bank side effects
pub struct EvidenceTool {
    inner: Arc<dyn Tool>,
    bank: Arc<Mutex<MemoryBank>>,
    description: String,
}

impl EvidenceTool {
    /// Wrap `inner` so its results land in `bank`.
    pub fn new(inner: Arc<dyn Tool>, bank: Arc<Mutex<MemoryBank>>) -> Self {
        let description = format!(
            "{} Evidence found is saved to the memory bank and acknowledged with citation IDs.",
            inner.description()
        );
        EvidenceTool {
            inner,
            bank,
            description,
        }
    }
}

#[async_trait]
impl Tool for EvidenceTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let result = self.inner.execute(args).await?;
        if !result.success {
            return Ok(result);
        }
        let output = result.into_text();

        let chunks = chunk_output(&output);
        let mut bank = self.bank.lock().expect("memory bank lock");
        let observations: Vec<String> = chunks
            .into_iter()
            .map(|(content, summary)| bank.add_evidence(content, summary))
            .collect();
        debug!(
            "Added {} evidence chunks from tool '{}'",
            observations.len(),
            self.inner.name()
        );
        Ok(ToolResult::success(observations.join("\n")))
    }
}

/// Split tool output into `(full_content, summary)` evidence chunks.
///
/// Best-effort: numbered `N. [Title](URL)` entries become one chunk each;
/// when nothing matches, the whole output is a single chunk.
fn chunk_output(output: &str) -> Vec<(String, String)> {
    let mut chunks = Vec::new();
    for section in output.split(SECTION_SEPARATOR) {
        chunks.extend(parse_numbered_entries(section));
    }
    if chunks.is_empty() {
        let summary = truncate_summary(output, FALLBACK_SUMMARY_CHARS);
        chunks.push((output.to_string(), summary));
    }
    chunks
}

/// Parse `N. [Title](URL)` entries followed by snippet lines.
fn parse_numbered_entries(section: &str) -> Vec<(String, String)> {
    let lines: Vec<&str> = section.lines().collect();
    let mut entries = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some((title, url)) = parse_entry_heading(line) else {
            continue;
        };

        let mut snippet_lines = Vec::new();
        for following in lines.iter().skip(i + 1).take(10) {
            let following = following.trim();
            if parse_entry_heading(following).is_some() {
                break;
            }
            if following.is_empty()
                || following.starts_with("Date published:")
                || following.starts_with("Source:")
            {
                continue;
            }
            snippet_lines.push(following);
        }
        let snippet = snippet_lines.join(" ");
        if snippet.is_empty() {
            continue;
        }

        let content = format!("Title: {}\nURL: {}\nSnippet: {}", title, url, snippet);
        let summary = truncate_summary(&format!("[{}] {}", title, snippet), SUMMARY_CHARS);
        entries.push((content, summary));
    }
    entries
}

/// Parse one `N. [Title](URL)` heading line.
fn parse_entry_heading(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    let first = trimmed.chars().next()?;
    if !first.is_ascii_digit() || !trimmed.contains(". [") {
        return None;
    }
    let title_start = trimmed.find('[')? + 1;
    let title_end = trimmed.find("](")?;
    let url_start = title_end + 2;
    let url_end = trimmed[url_start..].find(')')? + url_start;
    if title_end <= title_start || url_end <= url_start {
        return None;
    }
    Some((
        trimmed[title_start..title_end].to_string(),
        trimmed[url_start..url_end].to_string(),
    ))
}

fn truncate_summary(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

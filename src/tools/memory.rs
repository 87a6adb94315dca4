//! Citation memory bank and the retrieve tool
//!
//! The bank is an append-only store of evidence chunks keyed by dense
//! `id_N` citation IDs. The planner writes, the writer reads; one loop
//! invocation owns one bank, so contention is nil and the mutex only
//! guarantees reads never observe a partial write.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

use super::traits::{Tool, ToolResult};

/// One evidence chunk
#[derive(Debug, Clone)]
pub struct Evidence {
    /// Citation ID, `id_N` with N dense from 1
    pub id: String,
    /// Full original content
    pub content: String,
    /// Short summary shown to the planner
    pub summary: String,
}

/// Append-only evidence store keyed by citation ID
#[derive(Debug, Default)]
pub struct MemoryBank {
    entries: Vec<Evidence>,
}

impl MemoryBank {
    /// Create an empty bank
    pub fn new() -> Self {
        MemoryBank::default()
    }

    /// Create an empty bank behind the shared handle the tools expect
    pub fn shared() -> Arc<Mutex<MemoryBank>> {
        Arc::new(Mutex::new(MemoryBank::new()))
    }

    /// Append one evidence chunk; returns the acknowledgment string the
    /// planner observes.
    pub fn add_evidence(&mut self, content: impl Into<String>, summary: impl Into<String>) -> String {
        let id = format!("id_{}", self.entries.len() + 1);
        let summary = summary.into();
        self.entries.push(Evidence {
            id: id.clone(),
            content: content.into(),
            summary: summary.clone(),
        });
        format!("Evidence added with id='{}'. Summary: {}", id, summary)
    }

    /// Retrieve full contents for the given IDs. Missing IDs produce a
    /// per-ID "not found" line; the call itself always succeeds.
    pub fn retrieve(&self, ids: &[String]) -> String {
        ids.iter()
            .map(|id| match self.entries.iter().find(|e| &e.id == id) {
                Some(evidence) => format!("<{}: {}>", evidence.id, evidence.content),
                None => format!("<{}: not found in memory bank>", id),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of stored chunks
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// All citation IDs in insertion order
    pub fn all_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Drop all entries (between runs only; never during one)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Thin tool wrapper over `MemoryBank::retrieve`, the writer's only tool
pub struct RetrieveTool {
    bank: Arc<Mutex<MemoryBank>>,
}

impl RetrieveTool {
    /// Create a retrieve tool over a shared bank
    pub fn new(bank: Arc<Mutex<MemoryBank>>) -> Self {
        RetrieveTool { bank }
    }
}

#[async_trait]
impl Tool for RetrieveTool {
    fn name(&self) -> &str {
        "retrieve"
    }

    fn description(&self) -> &str {
        "Retrieve the full content of evidence chunks from the memory bank by citation ID."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "citation_ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Citation IDs to fetch, e.g. [\"id_1\", \"id_2\"]"
                }
            },
            "required": ["citation_ids"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let ids: Vec<String> = args
            .get("citation_ids")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(ToolResult::failure(
                "'citation_ids' is required and must be a non-empty array of IDs.",
            ));
        }

        let bank = self.bank.lock().expect("memory bank lock");
        Ok(ToolResult::success(bank.retrieve(&ids)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_ordered() {
        let mut bank = MemoryBank::new();
        let first = bank.add_evidence("Full evidence content here", "Short summary");
        assert!(first.contains("id_1"));
        assert!(first.contains("Short summary"));
        bank.add_evidence("Second", "s2");
        bank.add_evidence("Third", "s3");
        assert_eq!(bank.all_ids(), vec!["id_1", "id_2", "id_3"]);
        assert_eq!(bank.size(), 3);
    }

    #[test]
    fn retrieve_returns_content_and_not_found_lines() {
        let mut bank = MemoryBank::new();
        bank.add_evidence("Content 1", "Summary 1");
        let out = bank.retrieve(&["id_1".to_string(), "id_999".to_string()]);
        assert!(out.contains("Content 1"));
        assert_eq!(
            out.lines().filter(|l| l.contains("not found")).count(),
            1
        );
    }

    #[test]
    fn clear_resets_ids() {
        let mut bank = MemoryBank::new();
        bank.add_evidence("c", "s");
        bank.clear();
        assert_eq!(bank.size(), 0);
        let ack = bank.add_evidence("c2", "s2");
        assert!(ack.contains("id_1"));
    }

    #[tokio::test]
    async fn retrieve_tool_fetches_multiple_ids() {
        let bank = MemoryBank::shared();
        {
            let mut guard = bank.lock().unwrap();
            guard.add_evidence("Content 1", "Summary 1");
            guard.add_evidence("Content 2", "Summary 2");
        }
        let tool = RetrieveTool::new(bank);
        let result = tool
            .execute(serde_json::json!({"citation_ids": ["id_1", "id_2"]}))
            .await
            .unwrap();
        let text = result.into_text();
        assert!(text.contains("Content 1"));
        assert!(text.contains("Content 2"));
    }

    #[tokio::test]
    async fn retrieve_tool_requires_ids() {
        let tool = RetrieveTool::new(MemoryBank::shared());
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(!result.success);
    }
}

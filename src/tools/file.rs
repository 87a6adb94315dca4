//! Local file parsing tool
//!
//! Parses user-uploaded text-like files under the configured root directory.
//! Unsupported or unreadable files produce per-file error lines; the call as
//! a whole still succeeds so the agent can react to partial results.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::FileConfig;
use crate::error::Result;

use super::traits::{Tool, ToolResult};

/// Extensions the parser accepts as plain text
const TEXT_EXTENSIONS: [&str; 7] = ["txt", "md", "csv", "tsv", "json", "jsonl", "log"];

/// File parsing tool rooted at a configured directory
pub struct FileParserTool {
    config: FileConfig,
}

impl FileParserTool {
    /// Create a file parser tool
    pub fn new(config: FileConfig) -> Self {
        FileParserTool { config }
    }

    /// Resolve a user-supplied name inside the root, rejecting traversal.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return None;
        }
        Some(self.config.root.join(candidate))
    }

    fn parse_one(&self, name: &str) -> String {
        let Some(path) = self.resolve(name) else {
            return format!("Error parsing {}: invalid file name", name);
        };
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            return format!(
                "Error parsing {}: unsupported file type (supported: {})",
                name,
                TEXT_EXTENSIONS.join(", ")
            );
        }

        match std::fs::read(&path) {
            Ok(mut bytes) => {
                let truncated = bytes.len() > self.config.max_bytes;
                if truncated {
                    bytes.truncate(self.config.max_bytes);
                }
                let mut content = String::from_utf8_lossy(&bytes).into_owned();
                if truncated {
                    content.push_str("\n…(truncated)");
                }
                format!("## File: {}\n{}", name, content)
            }
            Err(e) => format!("Error parsing {}: {}", name, e),
        }
    }
}

#[async_trait]
impl Tool for FileParserTool {
    fn name(&self) -> &str {
        "parse_file"
    }

    fn description(&self) -> &str {
        "Parse user uploaded local files (TXT, MD, CSV, TSV, JSON, JSONL, LOG) and return their content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "The file names of the user uploaded local files to be parsed."
                }
            },
            "required": ["files"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let files: Vec<String> = match args.get("files") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(a)) => a
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => vec![],
        };
        if files.is_empty() {
            return Ok(ToolResult::failure(
                "'files' is required and must be an array of file names",
            ));
        }
        debug!("Parsing files: {:?}", files);

        // Disk reads run on the blocking pool.
        let tool_config = self.config.clone();
        let sections = tokio::task::spawn_blocking(move || {
            let parser = FileParserTool { config: tool_config };
            files
                .iter()
                .map(|f| parser.parse_one(f))
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .await
        .map_err(|e| crate::Error::Internal(format!("file parse task failed: {}", e)))?;

        Ok(ToolResult::success(sections))
    }
}

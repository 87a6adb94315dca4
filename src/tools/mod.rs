//! Tools module - capabilities the agent loops can invoke
//!
//! Each tool is a self-contained module implementing the `Tool` trait.
//! Tools are registered into a `ToolRegistry`; the per-loop `Dispatcher`
//! decodes LLM-emitted call blocks and executes against the registry.
//!
//! ## Built-in Tools
//!
//! - **search**: batched web search (Serper)
//! - **google_scholar**: academic search (Serper scholar endpoint)
//! - **visit**: fetch webpage(s) and summarize against a goal
//! - **python**: sandboxed code execution via an external sandbox service
//! - **parse_file**: parse user-uploaded text-like files
//! - **retrieve**: memory-bank lookup (writer only)
//!
//! The planner wraps the general tools in `EvidenceTool` so their output is
//! chunked into the shared memory bank.

mod traits;
mod registry;
mod search;
mod scholar;
mod visit;
mod interpreter;
mod file;
mod memory;
mod planner;

use std::sync::{Arc, Mutex};

use crate::agent::client::LlmClient;
use crate::config::Config;

// Core trait and types
pub use traits::{Tool, ToolCall, ToolResult};

// Registry and dispatcher
pub use registry::{Dispatcher, ToolRegistry};

// Built-in tools
pub use search::SearchTool;
pub use scholar::ScholarTool;
pub use visit::VisitTool;
pub use interpreter::CodeInterpreterTool;
pub use file::FileParserTool;

// Memory bank
pub use memory::{Evidence, MemoryBank, RetrieveTool};

// Planner wrapper
pub use planner::EvidenceTool;

/// Build the general-purpose tool registry from configuration.
pub fn default_registry(config: &Config, llm: Arc<LlmClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SearchTool::new(config.search.clone()));
    registry.register(ScholarTool::new(config.search.clone()));
    registry.register(VisitTool::new(llm));
    registry.register(CodeInterpreterTool::new(config.sandbox.clone()));
    registry.register(FileParserTool::new(config.files.clone()));
    registry
}

/// Wrap every tool of `registry` for the planner, collecting evidence into
/// `bank`.
pub fn evidence_registry(registry: &ToolRegistry, bank: Arc<Mutex<MemoryBank>>) -> ToolRegistry {
    let mut wrapped = ToolRegistry::new();
    for name in registry.names() {
        if let Some(tool) = registry.get(&name) {
            wrapped.register(EvidenceTool::new(tool, bank.clone()));
        }
    }
    wrapped
}

/// Whether text contains CJK codepoints (used for search localization and
/// token estimation).
pub(crate) fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cjk_detection() {
        assert!(contains_cjk("刘翔"));
        assert!(!contains_cjk("hello"));
    }

    #[test]
    fn evidence_registry_wraps_all_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(FileParserTool::new(crate::config::FileConfig::default()));
        let bank = MemoryBank::shared();
        let wrapped = evidence_registry(&registry, bank);
        assert_eq!(wrapped.count(), 1);
        assert!(wrapped.get("parse_file").is_some());
        assert!(wrapped
            .get("parse_file")
            .unwrap()
            .description()
            .contains("memory bank"));
    }
}

//! Tool registry and dispatcher
//!
//! The registry maps tool names to capabilities. The dispatcher is the
//! per-loop invocation layer: it decodes the (permissive-JSON) call block the
//! LLM emitted, repairs common argument mistakes, short-circuits idempotent
//! calls through a cache, and converts every failure into a readable string
//! result so the loop never aborts on a tool error.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::types::ToolDefinition;

use super::traits::Tool;

/// Fields auto-promoted from scalar to single-element list when the tool's
/// schema declares them as arrays.
const LIST_FIELDS: [&str; 3] = ["query", "url", "files"];

/// Registry of available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register an already-shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Keep only the named tools; an empty or unmatched whitelist keeps all.
    pub fn subset(&self, names: &[String]) -> ToolRegistry {
        let filtered: HashMap<String, Arc<dyn Tool>> = self
            .tools
            .iter()
            .filter(|(name, _)| names.iter().any(|n| n == *name))
            .map(|(name, tool)| (name.clone(), tool.clone()))
            .collect();
        if filtered.is_empty() {
            self.clone()
        } else {
            ToolRegistry { tools: filtered }
        }
    }

    /// Get tool count
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// List tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

/// Per-loop tool invocation layer with an idempotent-call cache
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    /// Tools whose results are cached by canonical `(name, args)`
    idempotent: HashSet<String>,
    cache: Mutex<HashMap<String, String>>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry with the default idempotent set
    /// (`retrieve` only).
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Dispatcher {
            registry,
            idempotent: HashSet::from(["retrieve".to_string()]),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the idempotent tool set
    pub fn with_idempotent(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.idempotent = names.into_iter().collect();
        self
    }

    /// Canonical cache key for a call, `None` when the tool is not cached.
    pub fn cache_key(&self, name: &str, arguments: &Value) -> Option<String> {
        if !self.idempotent.contains(name) {
            return None;
        }
        // serde_json keeps object keys sorted, so this is deterministic.
        serde_json::to_string(arguments)
            .ok()
            .map(|args| format!("{}::{}", name, args))
    }

    /// Invoke the tool named in `raw_block` and return the observation string.
    ///
    /// Never returns an error: unknown tools, malformed payloads, and tool
    /// failures all become `"Error: …"` observations.
    pub async fn invoke(&self, raw_block: &str) -> String {
        // Inline-code path: the interpreter receives its program in a
        // fenced tail rather than in the JSON arguments.
        if let Some(code) = extract_code_tail(raw_block) {
            return self
                .dispatch("python", serde_json::json!({ "code": code }))
                .await;
        }

        let parsed: Value = match json5::from_str(raw_block) {
            Ok(v) => v,
            Err(_) => {
                return "Error: Tool call is not a valid JSON. Tool call must contain a valid \
                        \"name\" and \"arguments\" field."
                    .to_string()
            }
        };

        let name = parsed
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = parsed
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        self.dispatch(&name, arguments).await
    }

    async fn dispatch(&self, name: &str, mut arguments: Value) -> String {
        let tool = match self.registry.get(name) {
            Some(tool) => tool,
            None => return format!("Error: Tool {} not found", name),
        };

        normalize_list_args(&mut arguments, &tool.parameters_schema());

        let cache_key = self.cache_key(name, &arguments);
        if let Some(ref key) = cache_key {
            if let Some(cached) = self.cache.lock().expect("cache lock").get(key) {
                debug!("Cache hit for tool '{}' with identical arguments", name);
                return cached.clone();
            }
        }

        let observation = match tool.execute(arguments).await {
            Ok(result) => result.into_text(),
            Err(e) => {
                warn!("Tool {} execution failed: {}", name, e);
                format!("Error: Tool execution failed. {}", e)
            }
        };

        if let Some(key) = cache_key {
            self.cache
                .lock()
                .expect("cache lock")
                .insert(key, observation.clone());
        }

        observation
    }
}

/// Extract the program from a `<code>…</code>` tail, when present.
fn extract_code_tail(block: &str) -> Option<String> {
    let start = block.find("<code>")?;
    let end = block.rfind("</code>")?;
    if end <= start {
        return None;
    }
    Some(block[start + "<code>".len()..end].trim().to_string())
}

/// Promote scalar values to single-element lists for schema-declared
/// array fields (`query`, `url`, `files`).
fn normalize_list_args(arguments: &mut Value, schema: &Value) {
    let Some(args) = arguments.as_object_mut() else {
        return;
    };
    let properties = schema.get("properties");
    for field in LIST_FIELDS {
        let declares_array = properties
            .and_then(|p| p.get(field))
            .and_then(|f| f.get("type"))
            .map(|t| match t {
                Value::String(s) => s == "array",
                Value::Array(kinds) => kinds.iter().any(|k| k == "array"),
                _ => false,
            })
            .unwrap_or(false);
        if !declares_array {
            continue;
        }
        if let Some(value) = args.get(field) {
            if value.is_string() {
                let promoted = Value::Array(vec![value.clone()]);
                args.insert(field.to_string(), promoted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tools::traits::ToolResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoTool {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "retrieve"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"citation_ids": {"type": "array", "items": {"type": "string"}}},
                "required": ["citation_ids"]
            })
        }
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::success(format!("echo: {}", args)))
        }
    }

    struct ListyTool;

    #[async_trait]
    impl Tool for ListyTool {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "array", "items": {"type": "string"}}},
                "required": ["query"]
            })
        }
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            Ok(ToolResult::success(args["query"].to_string()))
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_observation_not_an_error() {
        let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let obs = dispatcher.invoke(r#"{"name": "nope", "arguments": {}}"#).await;
        assert_eq!(obs, "Error: Tool nope not found");
    }

    #[tokio::test]
    async fn malformed_payload_is_recoverable() {
        let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let obs = dispatcher.invoke("not json at all {{{").await;
        assert!(obs.starts_with("Error: Tool call is not a valid JSON"));
    }

    #[tokio::test]
    async fn permissive_json_payloads_are_accepted() {
        let mut registry = ToolRegistry::new();
        registry.register(ListyTool);
        let dispatcher = Dispatcher::new(Arc::new(registry));
        // Trailing comma and unquoted key.
        let obs = dispatcher
            .invoke(r#"{name: "search", "arguments": {"query": ["a",],}}"#)
            .await;
        assert!(obs.contains("\"a\""));
    }

    #[tokio::test]
    async fn scalar_promoted_to_list_for_schema_array_fields() {
        let mut registry = ToolRegistry::new();
        registry.register(ListyTool);
        let dispatcher = Dispatcher::new(Arc::new(registry));
        let obs = dispatcher
            .invoke(r#"{"name": "search", "arguments": {"query": "single"}}"#)
            .await;
        assert_eq!(obs, r#"["single"]"#);
    }

    #[tokio::test]
    async fn idempotent_calls_hit_cache_byte_identically() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool {
            calls: calls.clone(),
        });
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let block = r#"{"name": "retrieve", "arguments": {"citation_ids": ["id_1"]}}"#;
        let first = dispatcher.invoke(block).await;
        let second = dispatcher.invoke(block).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_idempotent_tools_are_not_cached() {
        let mut registry = ToolRegistry::new();
        registry.register(ListyTool);
        let dispatcher = Dispatcher::new(Arc::new(registry));
        assert!(dispatcher
            .cache_key("search", &serde_json::json!({"query": ["x"]}))
            .is_none());
    }

    #[tokio::test]
    async fn code_tail_routes_to_python() {
        let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()));
        let obs = dispatcher
            .invoke("{\"name\": \"python\", \"arguments\": {}}\n<code>\nprint(1)\n</code>")
            .await;
        // No python tool registered here; the path itself must still resolve.
        assert_eq!(obs, "Error: Tool python not found");
    }

    #[test]
    fn subset_keeps_all_when_whitelist_unmatched() {
        let mut registry = ToolRegistry::new();
        registry.register(ListyTool);
        let subset = registry.subset(&["nonexistent".to_string()]);
        assert_eq!(subset.count(), 1);
    }
}

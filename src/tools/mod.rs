//! Tool system
//!
//! Every tool is a request/response transform over JSON arguments. Failures
//! come back as a structured [`ToolError`] and are rendered as tool results
//! with `isError: true`; nothing here panics into the transport.

mod analyze;
mod capabilities;
pub(crate) mod context;
mod diagram;
mod docs;
mod examples;
mod execution;
mod executor;
mod format;
mod mapping;
mod run;
mod validate;

pub use context::ToolContext;
pub use execution::{RunOutcome, RunRequest, execute_run};
pub use executor::ToolExecutor;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ToolError;

/// Names of every tool the server exposes, in listing order
pub const TOOL_NAMES: &[&str] = &[
    "list_capabilities",
    "list_examples",
    "get_example",
    "get_schema",
    "search_docs",
    "validate_recipe",
    "analyze_recipe",
    "run_recipe",
    "render_diagram",
    "generate_mapping",
    "format_recipe",
];

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the arguments object
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Structured tool output
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub structured: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(structured: Value) -> Self {
        Self {
            structured,
            is_error: false,
        }
    }

    pub fn error(structured: Value) -> Self {
        Self {
            structured,
            is_error: true,
        }
    }

    /// Result for a tool that returned `Err`
    pub fn from_error(err: &ToolError) -> Self {
        Self::error(serde_json::json!({ "error": err }))
    }

    /// MCP `tools/call` result: text content mirrors the structured value
    pub fn to_call_result(&self) -> Value {
        let text = serde_json::to_string_pretty(&self.structured).unwrap_or_else(|_| self.structured.to_string());
        serde_json::json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": self.structured,
            "isError": self.is_error,
        })
    }
}

/// Entry in `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Deserialize tool arguments; a missing arguments object counts as `{}`.
pub fn parse_args<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    let input = if input.is_null() { Value::Object(Default::default()) } else { input };
    serde_json::from_value(input).map_err(|e| ToolError::validation(format!("Invalid arguments: {}", e)))
}

/// `{name: value}` JSON object as command-line option pairs
pub fn option_pairs(options: Option<&serde_json::Map<String, Value>>) -> Vec<(String, String)> {
    options
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), crate::engine::option_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Schema fragment for the `recipe_path` / `recipe_text` pair
pub(crate) fn recipe_source_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "recipe_path".to_string(),
        serde_json::json!({
            "type": "string",
            "description": "Recipe file relative to the workspace root"
        }),
    );
    props.insert(
        "recipe_text".to_string(),
        serde_json::json!({
            "type": "string",
            "description": "Inline recipe YAML"
        }),
    );
    props
}

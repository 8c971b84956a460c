//! Tool registry and dispatch

use std::collections::HashMap;

use serde_json::Value;

use super::analyze::AnalyzeRecipeTool;
use super::capabilities::ListCapabilitiesTool;
use super::diagram::RenderDiagramTool;
use super::docs::{GetSchemaTool, SearchDocsTool};
use super::examples::{GetExampleTool, ListExamplesTool};
use super::format::FormatRecipeTool;
use super::mapping::GenerateMappingTool;
use super::run::RunRecipeTool;
use super::validate::ValidateRecipeTool;
use super::{Tool, ToolContext, ToolDefinition, ToolResult};

/// Registered tools, listed in registration order
pub struct ToolExecutor {
    tools: HashMap<&'static str, Box<dyn Tool>>,
    order: Vec<&'static str>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Executor with every server tool registered
    pub fn standard() -> Self {
        let mut executor = Self::new();
        executor.add_tool(Box::new(ListCapabilitiesTool));
        executor.add_tool(Box::new(ListExamplesTool));
        executor.add_tool(Box::new(GetExampleTool));
        executor.add_tool(Box::new(GetSchemaTool));
        executor.add_tool(Box::new(SearchDocsTool));
        executor.add_tool(Box::new(ValidateRecipeTool));
        executor.add_tool(Box::new(AnalyzeRecipeTool));
        executor.add_tool(Box::new(RunRecipeTool));
        executor.add_tool(Box::new(RenderDiagramTool));
        executor.add_tool(Box::new(GenerateMappingTool));
        executor.add_tool(Box::new(FormatRecipeTool));
        executor
    }

    /// Register a tool; a later tool with the same name replaces the earlier one.
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name, tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.order.clone()
    }

    /// Run a tool. `None` when no tool has that name.
    ///
    /// Tool errors are scrubbed and come back as an error result.
    pub async fn call(&self, name: &str, input: Value, ctx: &ToolContext) -> Option<ToolResult> {
        let tool = self.tools.get(name)?;
        log::debug!("Calling tool {}", name);
        let result = match tool.execute(input, ctx).await {
            Ok(result) => result,
            Err(err) => {
                log::info!("Tool {} failed: {} {}", name, err.kind, err.message);
                ToolResult::from_error(&ctx.present_error(err))
            }
        };
        Some(result)
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::sandbox::SecretScrubber;
    use crate::tools::TOOL_NAMES;
    use crate::tools::context::testing::context;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_standard_registers_every_tool() {
        let executor = ToolExecutor::standard();
        assert_eq!(executor.tool_names(), TOOL_NAMES.to_vec());
        for name in TOOL_NAMES {
            assert!(executor.has_tool(name));
        }
        assert!(!executor.has_tool("nope"));
    }

    #[test]
    fn test_definitions_have_object_schemas() {
        for def in ToolExecutor::standard().definitions() {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_none() {
        let (_dir, ctx) = context();
        assert!(ToolExecutor::standard().call("nope", json!({}), &ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_errors_are_scrubbed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = crate::sandbox::WorkspacePaths::new(dir.path()).unwrap();
        let scrubber = SecretScrubber::from_pairs([("SF_TOKEN", "super-secret-value")]);
        let ctx = ToolContext::new(
            Arc::new(crate::config::Config::default()),
            paths,
            Arc::new(MockEngine::new()),
            scrubber,
        )
        .unwrap();

        let result = ToolExecutor::standard()
            .call("get_example", json!({"name": "super-secret-value.yml"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        let message = result.structured["error"]["message"].as_str().unwrap();
        assert!(!message.contains("super-secret-value"));
        assert!(message.contains("[REDACTED:SF_TOKEN]"));
    }
}

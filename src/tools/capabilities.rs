//! list_capabilities tool

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{TOOL_NAMES, Tool, ToolContext, ToolResult};
use crate::catalog::discovery::{DIAGRAM_FORMATS, SUPPORTED_FORMATS};
use crate::error::ToolError;
use crate::resources::URI_TEMPLATES;

pub struct ListCapabilitiesTool;

#[async_trait]
impl Tool for ListCapabilitiesTool {
    fn name(&self) -> &'static str {
        "list_capabilities"
    }

    fn description(&self) -> &'static str {
        "Report the Snowfakery version, supported output formats, server limits, gates, resources and tools."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let limits = &ctx.config.limits;
        let gates = &ctx.config.gates;
        let mut resources: Vec<String> = ctx.catalog.entries().map(|e| e.uri.clone()).collect();
        resources.extend(URI_TEMPLATES.iter().map(|t| t.to_string()));

        Ok(ToolResult::success(json!({
            "server": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "engine": ctx.engine.name(),
            "snowfakery_version": ctx.engine_version().await,
            "supported_output_formats": SUPPORTED_FORMATS,
            "diagram_formats": DIAGRAM_FORMATS,
            "limits": {
                "timeout_seconds": limits.timeout_seconds,
                "max_capture_chars": limits.max_capture_chars,
                "max_reps": limits.max_reps,
                "max_target_count": limits.max_target_count,
                "require_bounded_runs": limits.require_bounded_runs,
                "max_runs": ctx.config.runs.max_runs,
            },
            "gates": {
                "allow_network": gates.allow_network,
                "allow_database": gates.allow_database,
            },
            "content_sources": ctx.catalog.origins(),
            "resources": resources,
            "tools": TOOL_NAMES,
        })))
    }
}

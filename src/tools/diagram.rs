//! render_diagram tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::execution::{RunRequest, execute_run};
use super::{Tool, ToolContext, ToolResult, parse_args, recipe_source_properties};
use crate::catalog::discovery::DIAGRAM_FORMATS;
use crate::error::ToolError;
use crate::recipe::RecipeArgs;
use crate::sandbox::stopping_criterion;

pub struct RenderDiagramTool;

fn default_format() -> String {
    "dot".to_string()
}

#[derive(Debug, Deserialize)]
struct DiagramArgs {
    #[serde(flatten)]
    recipe: RecipeArgs,
    #[serde(default = "default_format")]
    format: String,
    #[serde(default)]
    reps: Option<i64>,
}

#[async_trait]
impl Tool for RenderDiagramTool {
    fn name(&self) -> &'static str {
        "render_diagram"
    }

    fn description(&self) -> &'static str {
        "Render an entity-relationship diagram of the data a recipe generates. dot and svg are \
         returned inline; image formats are available as a run resource."
    }

    fn input_schema(&self) -> Value {
        let mut props = recipe_source_properties();
        props.insert(
            "format".to_string(),
            json!({ "type": "string", "enum": DIAGRAM_FORMATS, "default": "dot" }),
        );
        props.insert(
            "reps".to_string(),
            json!({ "type": "integer", "minimum": 1, "description": "Repetitions to sample for the diagram" }),
        );
        json!({ "type": "object", "properties": props })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: DiagramArgs = parse_args(input)?;

        let format = args.format.trim().to_lowercase();
        if !DIAGRAM_FORMATS.contains(&format.as_str()) {
            return Err(ToolError::validation(format!(
                "Unsupported diagram format '{}'; expected one of {}",
                args.format,
                DIAGRAM_FORMATS.join(", ")
            )));
        }
        let stopping = stopping_criterion(&ctx.config.limits, Some(args.reps.unwrap_or(1)), None)?;

        let loaded = ctx.load_recipe(&args.recipe)?;
        ctx.check_boundary(&loaded, None)?;

        let mut request = RunRequest::new(self.name(), loaded, &format, stopping);
        request.artifact_stem = "diagram";
        let outcome = execute_run(ctx, request).await?;

        let resources = outcome.record.resources();
        if let Some(error) = &outcome.error {
            return Ok(ToolResult::error(json!({
                "run_id": outcome.run_id(),
                "ok": false,
                "error": error,
                "resources": resources,
            })));
        }

        let mut result = json!({
            "run_id": outcome.run_id(),
            "ok": true,
            "format": format,
            "diagram_uri": outcome.artifact_uri(),
            "resources": resources,
        });
        if let Some((text, truncated)) = &outcome.preview {
            result["diagram_text"] = json!(text);
            result["diagram_truncated"] = json!(truncated);
        }
        Ok(ToolResult::success(result))
    }
}

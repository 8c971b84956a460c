//! analyze_recipe tool

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args, recipe_source_properties};
use crate::error::ToolError;
use crate::recipe::{RecipeArgs, static_check, summarize};

pub struct AnalyzeRecipeTool;

#[async_trait]
impl Tool for AnalyzeRecipeTool {
    fn name(&self) -> &'static str {
        "analyze_recipe"
    }

    fn description(&self) -> &'static str {
        "Parse a recipe (without running it) and summarise its tables, fields, friends, nicknames, \
         references, declared plugins and options, and table dependency order."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": recipe_source_properties() })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: RecipeArgs = parse_args(input)?;
        let loaded = ctx.load_recipe(&args)?;
        let mut report = static_check(&loaded, &ctx.paths);

        let Some(recipe) = report.recipe.take() else {
            return Err(report
                .errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ToolError::validation("Recipe could not be parsed")));
        };

        let summary = summarize(&recipe, &loaded.display_name);
        let mut value = serde_json::to_value(&summary)
            .map_err(|e| ToolError::runtime(format!("Cannot serialise summary: {}", e)))?;
        value["filename"] = json!(loaded.display_name);
        value["issues"] = json!(report.errors);
        value["notes"] = json!(report.notes);
        Ok(ToolResult::success(value))
    }
}

//! format_recipe tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args, recipe_source_properties};
use crate::error::ToolError;
use crate::recipe::{RecipeArgs, format_recipe};

pub struct FormatRecipeTool;

#[derive(Debug, Deserialize)]
struct FormatArgs {
    #[serde(flatten)]
    recipe: RecipeArgs,
    #[serde(default)]
    write: bool,
}

#[async_trait]
impl Tool for FormatRecipeTool {
    fn name(&self) -> &'static str {
        "format_recipe"
    }

    fn description(&self) -> &'static str {
        "Normalise a recipe's whitespace without changing its parsed value. With write=true and \
         recipe_path, the file is rewritten in place."
    }

    fn input_schema(&self) -> Value {
        let mut props = recipe_source_properties();
        props.insert(
            "write".to_string(),
            json!({ "type": "boolean", "default": false, "description": "Rewrite recipe_path in place" }),
        );
        json!({ "type": "object", "properties": props })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: FormatArgs = parse_args(input)?;
        let loaded = ctx.load_recipe(&args.recipe)?;
        if args.write && loaded.path.is_none() {
            return Err(ToolError::validation("write requires recipe_path"));
        }

        let formatted = format_recipe(&loaded.text, &loaded.display_name)?;

        let mut written = false;
        if let Some(path) = loaded.path.as_ref().filter(|_| args.write && formatted.changed) {
            tokio::fs::write(path, &formatted.text)
                .await
                .map_err(|e| ToolError::runtime(format!("Cannot write {}: {}", loaded.display_name, e)))?;
            log::info!("Formatted {}", loaded.display_name);
            written = true;
        }

        Ok(ToolResult::success(json!({
            "changed": formatted.changed,
            "conservative": formatted.conservative,
            "written": written,
            "text": formatted.text,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::context::testing::context;

    #[tokio::test]
    async fn test_inline_format() {
        let (_dir, ctx) = context();
        let result = FormatRecipeTool
            .execute(json!({"recipe_text": "- object: A   \r\n\r\n\r\n- object: B"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["changed"], true);
        assert_eq!(result.structured["written"], false);
        assert_eq!(result.structured["text"], "- object: A\n\n- object: B\n");
    }

    #[tokio::test]
    async fn test_write_in_place() {
        let (dir, ctx) = context();
        let path = dir.path().join("r.yml");
        std::fs::write(&path, "- object: A  \n").unwrap();

        let result = FormatRecipeTool
            .execute(json!({"recipe_path": "r.yml", "write": true}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["written"], true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "- object: A\n");

        let again = FormatRecipeTool
            .execute(json!({"recipe_path": "r.yml", "write": true}), &ctx)
            .await
            .unwrap();
        assert_eq!(again.structured["changed"], false);
        assert_eq!(again.structured["written"], false);
    }

    #[tokio::test]
    async fn test_write_requires_path() {
        let (_dir, ctx) = context();
        let err = FormatRecipeTool
            .execute(json!({"recipe_text": "- object: A\n", "write": true}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }
}

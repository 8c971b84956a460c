//! validate_recipe tool
//!
//! Static checks run first. Only a statically clean recipe is handed to the
//! engine, in validate-only mode, under the configured timeout.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{Tool, ToolContext, ToolResult, option_pairs, parse_args, recipe_source_properties};
use crate::engine::{EngineError, EngineJob, classify_failure};
use crate::error::ToolError;
use crate::recipe::{LoadedRecipe, RecipeArgs, static_check};

pub struct ValidateRecipeTool;

#[derive(Debug, Deserialize)]
struct ValidateArgs {
    #[serde(flatten)]
    recipe: RecipeArgs,
    #[serde(default)]
    options: Option<Map<String, Value>>,
    #[serde(default)]
    plugin_options: Option<Map<String, Value>>,
    /// Skip the engine pass
    #[serde(default)]
    static_only: bool,
}

/// Result of the engine pass
enum EngineVerdict {
    Valid,
    Invalid(ToolError),
    Skipped(String),
}

#[async_trait]
impl Tool for ValidateRecipeTool {
    fn name(&self) -> &'static str {
        "validate_recipe"
    }

    fn description(&self) -> &'static str {
        "Validate a recipe without generating data: YAML syntax, statement shape and undeclared references, \
         then Snowfakery's own validate-only pass."
    }

    fn input_schema(&self) -> Value {
        let mut props = recipe_source_properties();
        props.insert(
            "options".to_string(),
            json!({ "type": "object", "description": "Recipe option values" }),
        );
        props.insert(
            "plugin_options".to_string(),
            json!({ "type": "object", "description": "Plugin option values" }),
        );
        props.insert(
            "static_only".to_string(),
            json!({ "type": "boolean", "default": false, "description": "Skip the Snowfakery pass" }),
        );
        json!({ "type": "object", "properties": props })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: ValidateArgs = parse_args(input)?;
        let loaded = ctx.load_recipe(&args.recipe)?;

        let report = static_check(&loaded, &ctx.paths);
        let mut notes = report.notes.clone();

        if !report.is_clean() {
            let errors: Vec<ToolError> = report.errors.into_iter().map(|e| ctx.present_error(e)).collect();
            return Ok(ToolResult::success(json!({
                "valid": false,
                "errors": errors,
                "engine_checked": false,
                "notes": notes,
            })));
        }

        let verdict = if args.static_only {
            EngineVerdict::Skipped("Snowfakery pass skipped (static_only)".to_string())
        } else if let Err(gate) = ctx.check_gates(&report, None) {
            EngineVerdict::Skipped(format!("Snowfakery pass skipped: {}", gate.message))
        } else {
            engine_pass(
                ctx,
                &loaded,
                option_pairs(args.options.as_ref()),
                option_pairs(args.plugin_options.as_ref()),
            )
            .await?
        };

        let (valid, errors, engine_checked) = match verdict {
            EngineVerdict::Valid => (true, Vec::new(), true),
            EngineVerdict::Invalid(err) => (false, vec![ctx.present_error(err)], true),
            EngineVerdict::Skipped(note) => {
                notes.push(note);
                (true, Vec::new(), false)
            }
        };

        Ok(ToolResult::success(json!({
            "valid": valid,
            "errors": errors,
            "engine_checked": engine_checked,
            "notes": notes,
        })))
    }
}

async fn engine_pass(
    ctx: &ToolContext,
    loaded: &LoadedRecipe,
    options: Vec<(String, String)>,
    plugin_options: Vec<(String, String)>,
) -> Result<EngineVerdict, ToolError> {
    let scratch_root = ctx.paths.scratch_root();
    tokio::fs::create_dir_all(&scratch_root)
        .await
        .map_err(|e| ToolError::runtime(format!("Cannot create scratch directory: {}", e)))?;
    let scratch = tempfile::Builder::new()
        .prefix("validate-")
        .tempdir_in(&scratch_root)
        .map_err(|e| ToolError::runtime(format!("Cannot create scratch directory: {}", e)))?;

    let (recipe_path, working_dir) = match &loaded.path {
        Some(path) => (
            path.clone(),
            loaded.base_dir.clone().unwrap_or_else(|| ctx.paths.root().to_path_buf()),
        ),
        None => {
            let path = scratch.path().join("recipe.yml");
            tokio::fs::write(&path, &loaded.text)
                .await
                .map_err(|e| ToolError::runtime(format!("Cannot write recipe copy: {}", e)))?;
            (path, scratch.path().to_path_buf())
        }
    };

    let job = EngineJob {
        recipe_path: recipe_path.clone(),
        working_dir,
        output_format: "txt".to_string(),
        output_file: Some(scratch.path().join("output.txt")),
        options,
        plugin_options,
        validate_only: true,
        ..Default::default()
    };

    let verdict = match tokio::time::timeout(ctx.config.limits.timeout(), ctx.engine.execute(&job)).await {
        Err(_) => EngineVerdict::Invalid(ToolError::limit(format!(
            "Validation exceeded the {}s timeout",
            ctx.config.limits.timeout_seconds
        ))),
        Ok(Err(EngineError::Unavailable(message))) => {
            log::warn!("Skipping engine validation: {}", message);
            EngineVerdict::Skipped(format!("Snowfakery pass skipped: {}", message))
        }
        Ok(Err(EngineError::Io(e))) => EngineVerdict::Invalid(ToolError::runtime(format!("Failed to run Snowfakery: {}", e))),
        Ok(Ok(output)) if output.success => EngineVerdict::Valid,
        Ok(Ok(output)) => EngineVerdict::Invalid(classify_failure(
            &output.stderr,
            &output.stdout,
            &recipe_path.display().to_string(),
            &loaded.display_name,
        )),
    };
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::error::ErrorKind;
    use crate::tools::context::testing::{context, context_with};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_valid_recipe() {
        let (_dir, ctx) = context();
        let result = ValidateRecipeTool
            .execute(json!({"recipe_text": "- object: Account\n  fields:\n    name: Acme\n"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["valid"], true);
        assert_eq!(result.structured["engine_checked"], true);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_undeclared_reference_names_line() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let recipe = "- object: Account\n- object: Contact\n  fields:\n    account:\n      reference: Acount\n";
        let result = ValidateRecipeTool.execute(json!({"recipe_text": recipe}), &ctx).await.unwrap();

        assert_eq!(result.structured["valid"], false);
        let errors = result.structured["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["kind"], "validation_error");
        assert_eq!(errors[0]["line"], 5);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_syntax_error_has_location() {
        let (_dir, ctx) = context();
        let result = ValidateRecipeTool
            .execute(json!({"recipe_text": "- object: A\n  fields: [unclosed\n"}), &ctx)
            .await
            .unwrap();
        let error = &result.structured["errors"][0];
        assert_eq!(error["kind"], "syntax_error");
        assert!(error["line"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let engine = Arc::new(MockEngine::failing("Error: DataGenNameError: unknown name near recipe.yml:2\n"));
        let (_dir, ctx) = context_with(engine, |_| {});
        let result = ValidateRecipeTool
            .execute(json!({"recipe_text": "- object: A\n"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["valid"], false);
        assert_eq!(result.structured["errors"][0]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_static_only_skips_engine() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let result = ValidateRecipeTool
            .execute(json!({"recipe_text": "- object: A\n", "static_only": true}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["valid"], true);
        assert_eq!(result.structured["engine_checked"], false);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let (_dir, ctx) = context();
        let err = ValidateRecipeTool
            .execute(json!({"recipe_path": "../outside.yml"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathContainment);
    }

    #[tokio::test]
    async fn test_update_key_reaches_engine() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let recipe = "- object: Account\n  update_key: AccountNumber\n  fields: {AccountNumber: A1}\n";
        let result = ValidateRecipeTool.execute(json!({"recipe_text": recipe}), &ctx).await.unwrap();

        assert_eq!(result.structured["valid"], true, "{}", result.structured);
        assert_eq!(result.structured["engine_checked"], true);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_included_gate_skips_engine() {
        let engine = Arc::new(MockEngine::new());
        let (dir, ctx) = context_with(engine.clone(), |_| {});
        std::fs::write(dir.path().join("data.yml"), "- object: A\n  fields:\n    src: https://example.com/a.csv\n").unwrap();
        std::fs::write(dir.path().join("main.yml"), "- include_file: data.yml\n- object: B\n").unwrap();

        let result = ValidateRecipeTool.execute(json!({"recipe_path": "main.yml"}), &ctx).await.unwrap();
        assert_eq!(result.structured["engine_checked"], false);
        assert!(result.structured["notes"].to_string().contains("network"));
        assert_eq!(engine.calls(), 0);
    }
}

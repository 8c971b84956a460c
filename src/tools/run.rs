//! run_recipe tool

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::execution::{RunOutcome, RunRequest, execute_run};
use super::{Tool, ToolContext, ToolResult, option_pairs, parse_args, recipe_source_properties};
use crate::catalog::discovery::SUPPORTED_FORMATS;
use crate::error::ToolError;
use crate::recipe::RecipeArgs;
use crate::sandbox::{TargetNumber, stopping_criterion};

pub struct RunRecipeTool;

fn default_format() -> String {
    "txt".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RunArgs {
    #[serde(flatten)]
    recipe: RecipeArgs,
    #[serde(default)]
    reps: Option<i64>,
    #[serde(default)]
    target_number: Option<TargetNumber>,
    #[serde(default = "default_format")]
    output_format: String,
    #[serde(default)]
    options: Option<Map<String, Value>>,
    #[serde(default)]
    plugin_options: Option<Map<String, Value>>,
    #[serde(default = "default_true")]
    capture_output: bool,
    #[serde(default)]
    validate_only: bool,
    #[serde(default)]
    generate_continuation: bool,
    #[serde(default)]
    dburl: Option<String>,
}

#[async_trait]
impl Tool for RunRecipeTool {
    fn name(&self) -> &'static str {
        "run_recipe"
    }

    fn description(&self) -> &'static str {
        "Run a recipe with a bounded stopping criterion (reps or target_number) and return captured \
         output plus resource URIs for every artifact of the run."
    }

    fn input_schema(&self) -> Value {
        let mut props = recipe_source_properties();
        props.insert(
            "reps".to_string(),
            json!({ "type": "integer", "minimum": 1, "description": "Number of repetitions" }),
        );
        props.insert(
            "target_number".to_string(),
            json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string" },
                    "count": { "type": "integer", "minimum": 1 }
                },
                "required": ["table", "count"],
                "description": "Run until this many rows of the table exist"
            }),
        );
        props.insert(
            "output_format".to_string(),
            json!({ "type": "string", "enum": SUPPORTED_FORMATS, "default": "txt" }),
        );
        props.insert("options".to_string(), json!({ "type": "object" }));
        props.insert("plugin_options".to_string(), json!({ "type": "object" }));
        props.insert("capture_output".to_string(), json!({ "type": "boolean", "default": true }));
        props.insert("validate_only".to_string(), json!({ "type": "boolean", "default": false }));
        props.insert("generate_continuation".to_string(), json!({ "type": "boolean", "default": false }));
        props.insert(
            "dburl".to_string(),
            json!({ "type": "string", "description": "Database URL to write to (requires allow_database)" }),
        );
        json!({ "type": "object", "properties": props })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: RunArgs = parse_args(input)?;

        let output_format = args.output_format.trim().to_lowercase();
        if !SUPPORTED_FORMATS.contains(&output_format.as_str()) {
            return Err(ToolError::validation(format!(
                "Unsupported output_format '{}'; expected one of {}",
                args.output_format,
                SUPPORTED_FORMATS.join(", ")
            )));
        }
        let stopping = stopping_criterion(&ctx.config.limits, args.reps, args.target_number.as_ref())?;

        let loaded = ctx.load_recipe(&args.recipe)?;
        ctx.check_boundary(&loaded, args.dburl.as_deref())?;

        let mut request = RunRequest::new(self.name(), loaded, &output_format, stopping);
        request.options = option_pairs(args.options.as_ref());
        request.plugin_options = option_pairs(args.plugin_options.as_ref());
        request.capture_output = args.capture_output;
        request.validate_only = args.validate_only;
        request.continuation = args.generate_continuation;
        request.dburl = args.dburl;

        let outcome = execute_run(ctx, request).await?;
        Ok(run_result(&outcome, &output_format))
    }
}

fn run_result(outcome: &RunOutcome, output_format: &str) -> ToolResult {
    let resources = outcome.record.resources();
    match &outcome.error {
        Some(error) => ToolResult::error(json!({
            "run_id": outcome.run_id(),
            "ok": false,
            "error": error,
            "resources": resources,
        })),
        None => {
            let (stdout_text, stdout_truncated) = outcome.preview.clone().unwrap_or_default();
            ToolResult::success(json!({
                "run_id": outcome.run_id(),
                "ok": true,
                "output_format": output_format,
                "stdout_text": stdout_text,
                "stdout_truncated": stdout_truncated,
                "output_uri": outcome.artifact_uri(),
                "resources": resources,
                "summary": outcome.summary,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::error::ErrorKind;
    use crate::tools::context::testing::{context, context_with};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_target_number_produces_exact_rows() {
        let (_dir, ctx) = context();
        let result = RunRecipeTool
            .execute(
                json!({
                    "recipe_text": "- object: Account\n  friends:\n    - object: Contact\n",
                    "target_number": {"table": "Account", "count": 5}
                }),
                &ctx,
            )
            .await
            .unwrap();

        let s = &result.structured;
        assert_eq!(s["ok"], true);
        let text = s["stdout_text"].as_str().unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("Account(")).count(), 5);
        let run_id = s["run_id"].as_str().unwrap();
        assert_eq!(s["output_uri"], format!("snowfakery://runs/{}/output.txt", run_id));
        assert_eq!(s["summary"]["rows"]["Account"], 5);
    }

    #[tokio::test]
    async fn test_bounded_runs_enforced() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |c| c.limits.require_bounded_runs = true);
        let err = RunRecipeTool
            .execute(json!({"recipe_text": "- object: A\n"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_limits_rejected_before_dispatch() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let err = RunRecipeTool
            .execute(json!({"recipe_text": "- object: A\n", "reps": 1000}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResourceLimitExceeded);

        let err = RunRecipeTool
            .execute(
                json!({"recipe_text": "- object: A\n", "reps": 1, "target_number": {"table": "A", "count": 1}}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_gates_rejected_before_dispatch() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let err = RunRecipeTool
            .execute(json!({"recipe_text": "- object: A\n", "dburl": "sqlite:///out.db"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationGate);

        let err = RunRecipeTool
            .execute(json!({"recipe_text": "- plugin: snowfakery.standard_plugins.Salesforce\n- object: A\n"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationGate);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_path_escape_never_reaches_engine() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let err = RunRecipeTool
            .execute(json!({"recipe_path": "recipes/../../secret.yml", "reps": 1}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathContainment);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let (_dir, ctx) = context();
        let err = RunRecipeTool
            .execute(json!({"recipe_text": "- object: A\n", "output_format": "xlsx"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_engine_failure_is_error_result() {
        let engine = Arc::new(MockEngine::failing("Error: something went wrong\n"));
        let (_dir, ctx) = context_with(engine, |_| {});
        let result = RunRecipeTool
            .execute(json!({"recipe_text": "- object: A\n"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.structured["ok"], false);
        assert_eq!(result.structured["error"]["kind"], "runtime_error");
        assert!(!result.structured["resources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capture_disabled() {
        let (_dir, ctx) = context();
        let result = RunRecipeTool
            .execute(json!({"recipe_text": "- object: A\n", "capture_output": false}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["stdout_text"], "");
        assert!(result.structured["output_uri"].is_string());
    }

    #[tokio::test]
    async fn test_output_truncated() {
        let (_dir, ctx) = context_with(Arc::new(MockEngine::new()), |c| c.limits.max_capture_chars = 10);
        let result = RunRecipeTool
            .execute(json!({"recipe_text": "- object: Account\n  count: 5\n"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.structured["stdout_truncated"], true);
        assert!(result.structured["stdout_text"].as_str().unwrap().ends_with("…(truncated)…\n"));
    }

    #[tokio::test]
    async fn test_included_plugin_is_gated() {
        let engine = Arc::new(MockEngine::new());
        let (dir, ctx) = context_with(engine.clone(), |_| {});
        std::fs::write(dir.path().join("sf.yml"), "- plugin: snowfakery.standard_plugins.Salesforce\n").unwrap();
        std::fs::write(dir.path().join("main.yml"), "- include_file: sf.yml\n- object: Account\n").unwrap();

        let err = RunRecipeTool
            .execute(json!({"recipe_path": "main.yml", "reps": 1}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationGate);
        assert_eq!(engine.calls(), 0);
        assert!(ctx.runs.is_empty().await);
    }

    #[tokio::test]
    async fn test_include_escape_never_reaches_engine() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        for recipe in ["- include_file: ../../../etc/hosts\n", "- include_file: /etc/hosts\n"] {
            let err = RunRecipeTool
                .execute(json!({"recipe_text": recipe, "reps": 1}), &ctx)
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::PathContainment, "{}", recipe);
        }
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_path_recipe_with_local_include_runs() {
        let engine = Arc::new(MockEngine::new());
        let (dir, ctx) = context_with(engine.clone(), |_| {});
        std::fs::write(dir.path().join("shared.yml"), "- object: Account\n").unwrap();
        std::fs::write(dir.path().join("main.yml"), "- include_file: shared.yml\n- object: Contact\n").unwrap();

        let result = RunRecipeTool
            .execute(json!({"recipe_path": "main.yml", "reps": 1}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(engine.calls(), 1);
    }
}

//! generate_mapping tool
//!
//! Snowfakery writes the mapping while generating one repetition. The
//! dependency order from static analysis is returned alongside it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::execution::{MAPPING_ARTIFACT, RunRequest, execute_run};
use super::{Tool, ToolContext, ToolResult, parse_args, recipe_source_properties};
use crate::error::ToolError;
use crate::recipe::{RecipeArgs, dependency_order};
use crate::sandbox::StoppingCriterion;

pub struct GenerateMappingTool;

#[derive(Debug, Deserialize)]
struct MappingArgs {
    #[serde(flatten)]
    recipe: RecipeArgs,
    #[serde(default)]
    load_declarations_paths: Vec<String>,
}

#[async_trait]
impl Tool for GenerateMappingTool {
    fn name(&self) -> &'static str {
        "generate_mapping"
    }

    fn description(&self) -> &'static str {
        "Generate a CumulusCI mapping file for a recipe by running it once with Snowfakery's mapping \
         output. The mapping is stored as a run resource."
    }

    fn input_schema(&self) -> Value {
        let mut props = recipe_source_properties();
        props.insert(
            "load_declarations_paths".to_string(),
            json!({
                "type": "array",
                "items": { "type": "string" },
                "description": "Workspace-relative .load.yml files with CumulusCI load declarations"
            }),
        );
        json!({ "type": "object", "properties": props })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: MappingArgs = parse_args(input)?;
        let loaded = ctx.load_recipe(&args.recipe)?;

        let mut declarations = Vec::new();
        for candidate in &args.load_declarations_paths {
            let path = ctx.paths.resolve_existing(candidate)?;
            if !path.is_file() {
                return Err(ToolError::not_found(format!("Load declarations file not found: {}", candidate)));
            }
            declarations.push(path);
        }

        let report = ctx.check_boundary(&loaded, None)?;
        let order = match &report.recipe {
            Some(recipe) if report.is_clean() => Some(dependency_order(recipe, &[]).order),
            _ => None,
        };

        let mut request = RunRequest::new(self.name(), loaded, "txt", StoppingCriterion::Reps { reps: 1 });
        request.capture_output = false;
        request.cci_mapping = true;
        request.load_declarations = declarations;
        let outcome = execute_run(ctx, request).await?;

        let resources = outcome.record.resources();
        let error = match &outcome.error {
            Some(error) => Some(error.clone()),
            None if !outcome.record.has_artifact(MAPPING_ARTIFACT) => {
                Some(ToolError::runtime("Snowfakery finished without writing a mapping file"))
            }
            None => None,
        };
        if let Some(error) = error {
            return Ok(ToolResult::error(json!({
                "run_id": outcome.run_id(),
                "ok": false,
                "error": error,
                "resources": resources,
            })));
        }

        let path = outcome.record.dir.join(MAPPING_ARTIFACT);
        let yaml = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::runtime(format!("Cannot read generated mapping: {}", e)))?;
        log::info!("generate_mapping {}: {} bytes", outcome.run_id(), yaml.len());

        let (preview, truncated) = ctx.capture(&yaml);
        Ok(ToolResult::success(json!({
            "run_id": outcome.run_id(),
            "ok": true,
            "mapping_preview": preview,
            "mapping_truncated": truncated,
            "mapping_uri": outcome.record.uri(MAPPING_ARTIFACT),
            "dependency_order": order,
            "resources": resources,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::error::ErrorKind;
    use crate::runs::ArtifactContent;
    use crate::tools::context::testing::{context, context_with};
    use std::sync::Arc;

    const RECIPE: &str = "\
- object: Contact
  fields:
    LastName: Smith
    AccountId:
      reference: Account
- object: Account
  fields:
    Name: Acme
";

    #[tokio::test]
    async fn test_mapping_run_is_registered() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let result = GenerateMappingTool
            .execute(json!({"recipe_text": RECIPE}), &ctx)
            .await
            .unwrap();
        let s = &result.structured;
        assert_eq!(s["ok"], true);
        assert_eq!(s["dependency_order"], json!(["Account", "Contact"]));
        assert_eq!(engine.calls(), 1);

        let preview = s["mapping_preview"].as_str().unwrap();
        assert!(preview.find("Insert Account").unwrap() < preview.find("Insert Contact").unwrap());

        let run_id = s["run_id"].as_str().unwrap();
        let content = ctx.runs.read_artifact(run_id, MAPPING_ARTIFACT).await.unwrap();
        assert_eq!(content, ArtifactContent::Text(preview.to_string()));
    }

    #[tokio::test]
    async fn test_declarations_passed_to_engine() {
        let (dir, ctx) = context();
        std::fs::write(
            dir.path().join("decl.load.yml"),
            "- sf_object: Contact\n  api: bulk\n",
        )
        .unwrap();
        let result = GenerateMappingTool
            .execute(
                json!({"recipe_text": RECIPE, "load_declarations_paths": ["decl.load.yml"]}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.structured["mapping_preview"].as_str().unwrap().contains("api: bulk"));
    }

    #[tokio::test]
    async fn test_declarations_outside_workspace_rejected() {
        let engine = Arc::new(MockEngine::new());
        let (_dir, ctx) = context_with(engine.clone(), |_| {});
        let err = GenerateMappingTool
            .execute(
                json!({"recipe_text": RECIPE, "load_declarations_paths": ["../decl.load.yml"]}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathContainment);
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_is_error_result() {
        let engine = Arc::new(MockEngine::failing(
            "Error: Cannot find an object named Nope near recipe.yml:4\n",
        ));
        let (_dir, ctx) = context_with(engine, |_| {});
        let result = GenerateMappingTool
            .execute(json!({"recipe_text": "- object: A\n  fields:\n    b:\n      reference: Nope\n"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.structured["ok"], false);
        assert_eq!(result.structured["error"]["kind"], "validation_error");
        assert!(!result.structured["resources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_included_gate_checked() {
        let engine = Arc::new(MockEngine::new());
        let (dir, ctx) = context_with(engine.clone(), |_| {});
        std::fs::write(dir.path().join("sf.yml"), "- plugin: snowfakery.standard_plugins.Salesforce\n").unwrap();
        std::fs::write(dir.path().join("main.yml"), "- include_file: sf.yml\n- object: A\n").unwrap();
        let err = GenerateMappingTool
            .execute(json!({"recipe_path": "main.yml"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationGate);
        assert_eq!(engine.calls(), 0);
    }
}

//! Engine runs that produce a registered run directory
//!
//! Callers do every pre-dispatch check (arguments, limits, containment,
//! gates) before building a [`RunRequest`]; from here on each request ends in
//! exactly one registered run, failed or not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::ToolContext;
use crate::catalog::discovery::{is_folder_format, is_textual_format};
use crate::engine::{EngineError, EngineJob, EngineOutput, classify_failure};
use crate::error::ToolError;
use crate::id::generate_run_id;
use crate::recipe::LoadedRecipe;
use crate::runs::{RunRecord, RunStatus};
use crate::sandbox::StoppingCriterion;

pub const RECIPE_ARTIFACT: &str = "recipe.yml";
pub const STDOUT_ARTIFACT: &str = "stdout.txt";
pub const STDERR_ARTIFACT: &str = "stderr.txt";
pub const CONTINUATION_ARTIFACT: &str = "continuation.yml";
pub const MAPPING_ARTIFACT: &str = "mapping.yml";
pub const CSV_ARTIFACT: &str = "csv";

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub tool: &'static str,
    pub recipe: LoadedRecipe,
    pub output_format: String,
    /// Artifact file stem: `output` or `diagram`
    pub artifact_stem: &'static str,
    pub stopping: StoppingCriterion,
    pub options: Vec<(String, String)>,
    pub plugin_options: Vec<(String, String)>,
    pub capture_output: bool,
    pub validate_only: bool,
    pub continuation: bool,
    /// Ask the engine for a CumulusCI mapping file
    pub cci_mapping: bool,
    /// Contained load declaration files for the mapping
    pub load_declarations: Vec<PathBuf>,
    pub dburl: Option<String>,
}

impl RunRequest {
    pub fn new(tool: &'static str, recipe: LoadedRecipe, output_format: &str, stopping: StoppingCriterion) -> Self {
        Self {
            tool,
            recipe,
            output_format: output_format.to_string(),
            artifact_stem: "output",
            stopping,
            options: Vec::new(),
            plugin_options: Vec::new(),
            capture_output: true,
            validate_only: false,
            continuation: false,
            cci_mapping: false,
            load_declarations: Vec::new(),
            dburl: None,
        }
    }

    /// Name of the main output artifact
    pub fn artifact_name(&self) -> String {
        if is_folder_format(&self.output_format) {
            CSV_ARTIFACT.to_string()
        } else {
            format!("{}.{}", self.artifact_stem, self.output_format)
        }
    }
}

/// What a finished run left behind
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub artifact: String,
    /// Scrubbed and truncated preview of a textual output
    pub preview: Option<(String, bool)>,
    pub summary: Value,
    pub error: Option<ToolError>,
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        &self.record.id
    }

    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn artifact_uri(&self) -> Option<String> {
        self.record
            .has_artifact(&self.artifact)
            .then(|| self.record.uri(&self.artifact))
    }
}

/// Run the engine for `request` inside a fresh run directory and register it.
pub async fn execute_run(ctx: &ToolContext, request: RunRequest) -> Result<RunOutcome, ToolError> {
    let run_id = generate_run_id();
    let run_dir = ctx.paths.runs_root().join(&run_id);
    tokio::fs::create_dir_all(&run_dir)
        .await
        .map_err(|e| ToolError::runtime(format!("Cannot create run directory: {}", e)))?;

    let snapshot = run_dir.join(RECIPE_ARTIFACT);
    tokio::fs::write(&snapshot, &request.recipe.text)
        .await
        .map_err(|e| ToolError::runtime(format!("Cannot write recipe snapshot: {}", e)))?;

    // Path sources run from their own location so relative includes resolve
    let (recipe_path, working_dir) = match &request.recipe.path {
        Some(path) => (
            path.clone(),
            request.recipe.base_dir.clone().unwrap_or_else(|| run_dir.clone()),
        ),
        None => (snapshot.clone(), run_dir.clone()),
    };

    let artifact = request.artifact_name();
    let job = EngineJob {
        recipe_path: recipe_path.clone(),
        working_dir,
        output_format: request.output_format.clone(),
        output_file: (!is_folder_format(&request.output_format)).then(|| run_dir.join(&artifact)),
        output_folder: is_folder_format(&request.output_format).then(|| run_dir.join(CSV_ARTIFACT)),
        options: request.options.clone(),
        plugin_options: request.plugin_options.clone(),
        stopping: Some(request.stopping.clone()),
        validate_only: request.validate_only,
        continuation_file: request.continuation.then(|| run_dir.join(CONTINUATION_ARTIFACT)),
        cci_mapping_file: request.cci_mapping.then(|| run_dir.join(MAPPING_ARTIFACT)),
        load_declarations: request.load_declarations.clone(),
        dburl: request.dburl.clone(),
    };

    log::info!(
        "{} {}: {} as {} ({})",
        request.tool,
        run_id,
        request.recipe.display_name,
        request.output_format,
        request.stopping.describe()
    );

    let timeout = ctx.config.limits.timeout();
    let outcome = tokio::time::timeout(timeout, ctx.engine.execute(&job)).await;

    let error = match outcome {
        Err(_) => {
            log::warn!("{} timed out after {:?}", run_id, timeout);
            Some(ToolError::limit(format!(
                "Recipe execution exceeded the {}s timeout",
                ctx.config.limits.timeout_seconds
            )))
        }
        Ok(Err(EngineError::Unavailable(message))) => Some(ToolError::runtime(message)),
        Ok(Err(EngineError::Io(e))) => Some(ToolError::runtime(format!("Failed to run Snowfakery: {}", e))),
        Ok(Ok(output)) => {
            write_streams(ctx, &run_dir, &output).await;
            if output.success {
                None
            } else {
                Some(classify_failure(
                    &output.stderr,
                    &output.stdout,
                    &recipe_path.display().to_string(),
                    &request.recipe.display_name,
                ))
            }
        }
    };
    let error = error.map(|e| ctx.present_error(e));

    let status = if error.is_none() { RunStatus::Succeeded } else { RunStatus::Failed };
    let record = RunRecord::capture(&run_id, request.tool, status, &run_dir)
        .await
        .map_err(|e| ToolError::runtime(format!("Cannot list run artifacts: {}", e)))?;
    ctx.runs
        .register(record.clone())
        .await
        .map_err(|e| ToolError::runtime(e.to_string()))?;

    let mut summary = json!({
        "stopping_criterion": request.stopping,
        "validate_only": request.validate_only,
    });
    let mut preview = None;
    if error.is_none() && !request.validate_only {
        let rows = count_rows(&request.output_format, &run_dir.join(&artifact)).await;
        if !rows.is_empty() {
            summary["rows"] = json!(rows);
        }
        if request.capture_output && is_textual_format(&request.output_format) {
            let text = tokio::fs::read_to_string(run_dir.join(&artifact)).await.unwrap_or_default();
            preview = Some(ctx.capture(&text));
        }
    }

    Ok(RunOutcome {
        record,
        artifact,
        preview,
        summary,
        error,
    })
}

async fn write_streams(ctx: &ToolContext, run_dir: &Path, output: &EngineOutput) {
    for (name, text) in [(STDOUT_ARTIFACT, &output.stdout), (STDERR_ARTIFACT, &output.stderr)] {
        if let Err(e) = tokio::fs::write(run_dir.join(name), ctx.scrub(text)).await {
            log::warn!("Failed to write {}: {}", name, e);
        }
    }
}

/// Rows per table in a finished output, for formats where that is cheap
async fn count_rows(format: &str, artifact: &Path) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    match format {
        "txt" => {
            let text = tokio::fs::read_to_string(artifact).await.unwrap_or_default();
            for line in text.lines() {
                if let Some((table, _)) = line.split_once('(')
                    && !table.is_empty()
                    && table.chars().all(|c| c.is_alphanumeric() || c == '_')
                {
                    *counts.entry(table.to_string()).or_insert(0) += 1;
                }
            }
        }
        "json" => {
            let text = tokio::fs::read_to_string(artifact).await.unwrap_or_default();
            if let Ok(Value::Array(rows)) = serde_json::from_str::<Value>(&text) {
                for row in rows {
                    if let Some(table) = row.get("_table").and_then(Value::as_str) {
                        *counts.entry(table.to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
        "csv" => {
            let Ok(mut entries) = tokio::fs::read_dir(artifact).await else {
                return counts;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let Some(table) = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(".csv"))
                    .map(str::to_string)
                else {
                    continue;
                };
                let text = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                counts.insert(table, text.lines().count().saturating_sub(1) as u64);
            }
        }
        _ => {}
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::error::ErrorKind;
    use crate::recipe::RecipeSource;
    use crate::tools::context::testing::{context, context_with};
    use std::sync::Arc;
    use std::time::Duration;

    fn inline(ctx: &ToolContext, text: &str) -> LoadedRecipe {
        RecipeSource::Inline(text.to_string()).load(&ctx.paths).unwrap()
    }

    #[tokio::test]
    async fn test_successful_run_registers_artifacts() {
        let (_dir, ctx) = context();
        let recipe = inline(&ctx, "- object: Account\n  count: 2\n");
        let outcome = execute_run(&ctx, RunRequest::new("run_recipe", recipe, "txt", StoppingCriterion::Reps { reps: 1 }))
            .await
            .unwrap();

        assert!(outcome.ok());
        assert_eq!(outcome.record.status, RunStatus::Succeeded);
        for artifact in ["output.txt", "recipe.yml", "stdout.txt", "stderr.txt"] {
            assert!(outcome.record.has_artifact(artifact), "{}", artifact);
        }
        assert_eq!(outcome.summary["rows"]["Account"], 2);
        let (preview, truncated) = outcome.preview.clone().unwrap();
        assert!(preview.contains("Account(id=1)"));
        assert!(!truncated);
        assert!(ctx.runs.get(outcome.run_id()).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_is_classified_and_registered() {
        let engine = Arc::new(MockEngine::failing("Error: Cannot find an object named Acount near recipe.yml:3\n"));
        let (_dir, ctx) = context_with(engine, |_| {});
        let recipe = inline(&ctx, "- object: A\n");
        let outcome = execute_run(&ctx, RunRequest::new("run_recipe", recipe, "txt", StoppingCriterion::Reps { reps: 1 }))
            .await
            .unwrap();

        let err = outcome.error.clone().unwrap();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert_eq!(outcome.record.status, RunStatus::Failed);
        assert!(outcome.preview.is_none());
        assert!(outcome.record.has_artifact("stderr.txt"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_artifacts() {
        let engine = Arc::new(MockEngine::new().with_delay(Duration::from_secs(5)));
        let (_dir, ctx) = context_with(engine, |c| c.limits.timeout_seconds = 1);
        let recipe = inline(&ctx, "- object: Account\n");
        let outcome = execute_run(&ctx, RunRequest::new("run_recipe", recipe, "txt", StoppingCriterion::Reps { reps: 3 }))
            .await
            .unwrap();

        assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::ResourceLimitExceeded);
        assert!(outcome.record.has_artifact("output.txt"));
        assert!(outcome.artifact_uri().is_some());
    }

    #[tokio::test]
    async fn test_csv_run_counts_rows() {
        let (_dir, ctx) = context();
        let recipe = inline(&ctx, "- object: A\n  count: 3\n- object: B\n");
        let outcome = execute_run(&ctx, RunRequest::new("run_recipe", recipe, "csv", StoppingCriterion::Reps { reps: 1 }))
            .await
            .unwrap();

        assert_eq!(outcome.artifact, "csv");
        assert_eq!(outcome.summary["rows"]["A"], 3);
        assert_eq!(outcome.summary["rows"]["B"], 1);
        assert!(outcome.preview.is_none());
    }

    #[tokio::test]
    async fn test_continuation_artifact() {
        let (_dir, ctx) = context();
        let recipe = inline(&ctx, "- object: A\n");
        let mut request = RunRequest::new("run_recipe", recipe, "json", StoppingCriterion::Reps { reps: 1 });
        request.continuation = true;
        let outcome = execute_run(&ctx, request).await.unwrap();
        assert!(outcome.record.has_artifact(CONTINUATION_ARTIFACT));
    }

    #[test]
    fn test_artifact_names() {
        let recipe = LoadedRecipe {
            text: String::new(),
            path: None,
            display_name: "<recipe_text>".to_string(),
            base_dir: None,
        };
        let mut request = RunRequest::new("render_diagram", recipe, "svg", StoppingCriterion::Reps { reps: 1 });
        request.artifact_stem = "diagram";
        assert_eq!(request.artifact_name(), "diagram.svg");
        request.output_format = "csv".to_string();
        assert_eq!(request.artifact_name(), "csv");
    }
}

//! Shared state handed to every tool call

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::catalog::StaticCatalog;
use crate::config::Config;
use crate::engine::RecipeEngine;
use crate::error::{ErrorKind, Result, ToolError};
use crate::recipe::{LoadedRecipe, RecipeArgs, StaticReport, static_check};
use crate::runs::RunRegistry;
use crate::sandbox::{SecretScrubber, WorkspacePaths, check_gates, truncate};

/// Execution context for tools, built once at startup
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<Config>,
    pub paths: WorkspacePaths,
    pub catalog: Arc<StaticCatalog>,
    pub runs: Arc<RunRegistry>,
    pub engine: Arc<dyn RecipeEngine>,
    pub scrubber: Arc<SecretScrubber>,
    /// Engine version, probed on first use
    version: Arc<OnceCell<Option<String>>>,
}

impl ToolContext {
    /// Loads the static catalog from the workspace.
    pub fn new(
        config: Arc<Config>,
        paths: WorkspacePaths,
        engine: Arc<dyn RecipeEngine>,
        scrubber: SecretScrubber,
    ) -> Result<Self> {
        let catalog = StaticCatalog::load(&paths)?;
        let runs = RunRegistry::new(config.runs.max_runs);
        log::info!(
            "Tool context ready: root={}, engine={}, {} scrubbed variables",
            paths.root().display(),
            engine.name(),
            scrubber.len()
        );
        Ok(Self {
            config,
            paths,
            catalog: Arc::new(catalog),
            runs: Arc::new(runs),
            engine,
            scrubber: Arc::new(scrubber),
            version: Arc::new(OnceCell::new()),
        })
    }

    pub async fn engine_version(&self) -> Option<String> {
        self.version.get_or_init(|| self.engine.version()).await.clone()
    }

    pub fn scrub(&self, text: &str) -> String {
        self.scrubber.scrub(text)
    }

    /// Scrub and truncate captured output for inline return
    pub fn capture(&self, text: &str) -> (String, bool) {
        truncate(&self.scrub(text), self.config.limits.max_capture_chars)
    }

    /// Apply secret scrubbing and the traceback policy to an outgoing error.
    pub fn present_error(&self, mut err: ToolError) -> ToolError {
        err.message = self.scrub(&err.message);
        err.traceback = match err.traceback.take() {
            Some(tb) if self.config.debug.include_tracebacks => Some(self.capture(&tb).0),
            _ => None,
        };
        err
    }

    /// Resolve and read the recipe named by `args`
    pub fn load_recipe(&self, args: &RecipeArgs) -> std::result::Result<LoadedRecipe, ToolError> {
        args.source()?.load(&self.paths)
    }

    /// Checks every recipe must pass before the engine sees it: YAML syntax,
    /// containment of each `include_file`, and the gates over the recipe and
    /// everything it includes.
    ///
    /// Other static findings are left for the engine to report.
    pub fn check_boundary(
        &self,
        loaded: &LoadedRecipe,
        dburl: Option<&str>,
    ) -> std::result::Result<StaticReport, ToolError> {
        let report = static_check(loaded, &self.paths);
        if report.value.is_none() {
            return Err(report
                .errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ToolError::syntax("Recipe could not be parsed")));
        }
        if let Some(err) = report.errors.iter().find(|e| e.kind == ErrorKind::PathContainment) {
            return Err(err.clone());
        }
        self.check_gates(&report, dburl)?;
        Ok(report)
    }

    /// Gates over the top-level recipe and each included file
    pub fn check_gates(&self, report: &StaticReport, dburl: Option<&str>) -> std::result::Result<(), ToolError> {
        check_gates(&self.config.gates, report.value.as_ref(), dburl)?;
        for (name, value) in &report.included {
            check_gates(&self.config.gates, Some(value), None).map_err(|e| e.at(name.as_str(), None, None))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("root", &self.paths.root())
            .field("engine", &self.engine.name())
            .finish()
    }
}

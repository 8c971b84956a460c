//! Upstream engine seam
//!
//! `RecipeEngine` is the only way the server generates data. The production
//! implementation drives the `snowfakery` command-line program; tests use
//! [`mock::MockEngine`]. Timeouts are applied by the caller, so an engine must
//! release its resources when its future is dropped.

pub mod classify;
pub mod mock;
pub mod snowfakery;

use std::path::PathBuf;

use async_trait::async_trait;

pub use classify::classify_failure;
pub use mock::MockEngine;
pub use snowfakery::SnowfakeryCli;

use crate::sandbox::StoppingCriterion;

/// Everything one engine invocation needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineJob {
    /// Recipe file the engine reads
    pub recipe_path: PathBuf,
    /// Working directory; `include_file` paths resolve from the recipe's directory
    pub working_dir: PathBuf,
    pub output_format: String,
    pub output_file: Option<PathBuf>,
    /// Used instead of `output_file` for per-table formats (CSV)
    pub output_folder: Option<PathBuf>,
    pub options: Vec<(String, String)>,
    pub plugin_options: Vec<(String, String)>,
    pub stopping: Option<StoppingCriterion>,
    pub validate_only: bool,
    pub continuation_file: Option<PathBuf>,
    /// Where to write a CumulusCI mapping for the generated data
    pub cci_mapping_file: Option<PathBuf>,
    /// CumulusCI load declaration files applied to that mapping
    pub load_declarations: Vec<PathBuf>,
    pub dburl: Option<String>,
}

/// Raw result of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Failures to invoke the engine at all (as opposed to a recipe failing)
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Snowfakery is not available: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait RecipeEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Upstream version string, `None` when the engine cannot be reached
    async fn version(&self) -> Option<String>;

    async fn execute(&self, job: &EngineJob) -> Result<EngineOutput, EngineError>;
}

/// Render a JSON option value the way it is passed on a command line
pub fn option_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_option_value_rendering() {
        assert_eq!(option_value(&json!("EMEA")), "EMEA");
        assert_eq!(option_value(&json!(5)), "5");
        assert_eq!(option_value(&json!(true)), "true");
        assert_eq!(option_value(&json!(null)), "");
        assert_eq!(option_value(&json!([1, 2])), "[1,2]");
    }
}

//! `snowfakery` command-line driver

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{EngineError, EngineJob, EngineOutput, RecipeEngine};
use crate::config::EngineConfig;
use crate::sandbox::StoppingCriterion;

/// Runs one `snowfakery` child process per job
#[derive(Debug, Clone)]
pub struct SnowfakeryCli {
    bin: String,
    probe_timeout: Duration,
}

impl SnowfakeryCli {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            bin: config.snowfakery_bin.clone(),
            probe_timeout: Duration::from_secs(config.version_probe_timeout_seconds),
        }
    }

    /// Command-line arguments for a job, recipe path first
    pub fn args(job: &EngineJob) -> Vec<String> {
        let mut args = vec![job.recipe_path.display().to_string()];

        args.push("--output-format".to_string());
        args.push(job.output_format.clone());
        if let Some(folder) = &job.output_folder {
            args.push("--output-folder".to_string());
            args.push(folder.display().to_string());
        } else if let Some(file) = &job.output_file {
            args.push("--output-file".to_string());
            args.push(file.display().to_string());
        }

        match &job.stopping {
            Some(StoppingCriterion::Reps { reps }) => {
                args.push("--reps".to_string());
                args.push(reps.to_string());
            }
            Some(StoppingCriterion::Target { table, count }) => {
                args.push("--target-number".to_string());
                args.push(count.to_string());
                args.push(table.clone());
            }
            None => {}
        }

        for (name, value) in &job.options {
            args.push("--option".to_string());
            args.push(name.clone());
            args.push(value.clone());
        }
        for (name, value) in &job.plugin_options {
            args.push("--plugin-option".to_string());
            args.push(name.clone());
            args.push(value.clone());
        }
        if job.validate_only {
            args.push("--validate-only".to_string());
        }
        if let Some(path) = &job.continuation_file {
            args.push("--generate-continuation-file".to_string());
            args.push(path.display().to_string());
        }
        if let Some(path) = &job.cci_mapping_file {
            args.push("--generate-cci-mapping-file".to_string());
            args.push(path.display().to_string());
        }
        for path in &job.load_declarations {
            args.push("--load-declarations".to_string());
            args.push(path.display().to_string());
        }
        if let Some(url) = &job.dburl {
            args.push("--dburl".to_string());
            args.push(url.clone());
        }
        args
    }
}

#[async_trait]
impl RecipeEngine for SnowfakeryCli {
    fn name(&self) -> &str {
        "snowfakery"
    }

    async fn version(&self) -> Option<String> {
        let probe = Command::new(&self.bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                log::warn!("{} --version exited with {:?}", self.bin, output.status.code());
                return None;
            }
            Ok(Err(e)) => {
                log::warn!("Failed to run {} --version: {}", self.bin, e);
                return None;
            }
            Err(_) => {
                log::warn!("{} --version timed out", self.bin);
                return None;
            }
        };

        // "snowfakery, version 3.6.3" (click's version_option format)
        let text = String::from_utf8_lossy(&output.stdout);
        let line = text.lines().find(|l| !l.trim().is_empty())?.trim();
        Some(
            line.rsplit_once("version")
                .map(|(_, v)| v.trim().to_string())
                .unwrap_or_else(|| line.to_string()),
        )
    }

    async fn execute(&self, job: &EngineJob) -> Result<EngineOutput, EngineError> {
        let args = Self::args(job);
        log::debug!("Running {} {}", self.bin, args.join(" "));

        let child = Command::new(&self.bin)
            .args(&args)
            .current_dir(&job.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EngineError::Unavailable(format!("'{}' was not found on PATH", self.bin))
                }
                _ => EngineError::Io(e),
            })?;

        let output = child.wait_with_output().await?;

        Ok(EngineOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> EngineJob {
        EngineJob {
            recipe_path: PathBuf::from("/ws/recipe.yml"),
            working_dir: PathBuf::from("/ws"),
            output_format: "json".to_string(),
            output_file: Some(PathBuf::from("/ws/.snowfakery-mcp/runs/r/output.json")),
            ..Default::default()
        }
    }

    #[test]
    fn test_args_target_number() {
        let mut job = job();
        job.stopping = Some(StoppingCriterion::Target {
            table: "Account".to_string(),
            count: 5,
        });
        job.options = vec![("num".to_string(), "3".to_string())];

        let args = SnowfakeryCli::args(&job);
        assert_eq!(
            args,
            vec![
                "/ws/recipe.yml",
                "--output-format",
                "json",
                "--output-file",
                "/ws/.snowfakery-mcp/runs/r/output.json",
                "--target-number",
                "5",
                "Account",
                "--option",
                "num",
                "3",
            ]
        );
    }

    #[test]
    fn test_args_mapping_with_declarations() {
        let mut job = job();
        job.stopping = Some(StoppingCriterion::Reps { reps: 1 });
        job.cci_mapping_file = Some(PathBuf::from("/runs/r/mapping.yml"));
        job.load_declarations = vec![PathBuf::from("/ws/a.load.yml"), PathBuf::from("/ws/b.load.yml")];

        let args = SnowfakeryCli::args(&job);
        let tail: Vec<&str> = args.iter().skip(7).map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "--generate-cci-mapping-file",
                "/runs/r/mapping.yml",
                "--load-declarations",
                "/ws/a.load.yml",
                "--load-declarations",
                "/ws/b.load.yml",
            ]
        );
    }

    #[test]
    fn test_args_folder_wins_over_file() {
        let mut job = job();
        job.output_format = "csv".to_string();
        job.output_folder = Some(PathBuf::from("/out/csv"));
        job.stopping = Some(StoppingCriterion::Reps { reps: 2 });
        let args = SnowfakeryCli::args(&job);
        assert!(args.windows(2).any(|w| w == ["--output-folder", "/out/csv"]));
        assert!(!args.contains(&"--output-file".to_string()));
        assert!(args.windows(2).any(|w| w == ["--reps", "2"]));
    }

    #[test]
    fn test_args_flags() {
        let mut job = job();
        job.validate_only = true;
        job.continuation_file = Some(PathBuf::from("/c.yml"));
        job.dburl = Some("sqlite:///x.db".to_string());
        job.plugin_options = vec![("org_name".to_string(), "qa".to_string())];
        let args = SnowfakeryCli::args(&job);
        assert!(args.contains(&"--validate-only".to_string()));
        assert!(args.windows(2).any(|w| w == ["--generate-continuation-file", "/c.yml"]));
        assert!(args.windows(2).any(|w| w == ["--dburl", "sqlite:///x.db"]));
        assert!(args.windows(3).any(|w| w == ["--plugin-option", "org_name", "qa"]));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = SnowfakeryCli::new(&EngineConfig {
            snowfakery_bin: "/nonexistent/snowfakery-binary".to_string(),
            version_probe_timeout_seconds: 1,
        });
        assert!(engine.version().await.is_none());

        let dir = tempfile::tempdir().unwrap();
        let mut job = job();
        job.working_dir = dir.path().to_path_buf();
        let err = engine.execute(&job).await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }
}

//! Server configuration
//!
//! Loaded once at startup from YAML (explicit path, then
//! `~/.config/snowfakery-mcp/snowfakery-mcp.yml`, then `./snowfakery-mcp.yml`),
//! then overridden by `SNOWFAKERY_MCP_*` environment variables. The resulting
//! value is immutable for the process lifetime.

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SNOWFAKERY_MCP_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub workspace_root: Option<PathBuf>,
    pub limits: LimitsConfig,
    pub gates: GatesConfig,
    pub engine: EngineConfig,
    pub runs: RunsConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub timeout_seconds: u64,
    pub max_capture_chars: usize,
    pub max_reps: u64,
    pub max_target_count: u64,
    /// Reject run requests that carry neither `reps` nor `target_number`
    pub require_bounded_runs: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_capture_chars: 20_000,
            max_reps: 10,
            max_target_count: 1_000,
            require_bounded_runs: false,
        }
    }
}

impl LimitsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    pub allow_network: bool,
    pub allow_database: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Snowfakery executable, resolved through PATH when not absolute
    pub snowfakery_bin: String,
    pub version_probe_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snowfakery_bin: "snowfakery".to_string(),
            version_probe_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    /// Runs kept before the oldest is evicted
    pub max_runs: usize,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self { max_runs: 100 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub include_tracebacks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            workspace_root: None,
            limits: LimitsConfig::default(),
            gates: GatesConfig::default(),
            engine: EngineConfig::default(),
            runs: RunsConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `SNOWFAKERY_MCP_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

        if let Some(root) = get("WORKSPACE_ROOT") {
            self.workspace_root = Some(PathBuf::from(root));
        }
        if let Some(v) = get("TIMEOUT_SECONDS") {
            self.limits.timeout_seconds = parse_number("TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = get("MAX_CAPTURE_CHARS") {
            self.limits.max_capture_chars = parse_number("MAX_CAPTURE_CHARS", &v)?;
        }
        if let Some(v) = get("MAX_REPS") {
            self.limits.max_reps = parse_number("MAX_REPS", &v)?;
        }
        if let Some(v) = get("MAX_TARGET_COUNT") {
            self.limits.max_target_count = parse_number("MAX_TARGET_COUNT", &v)?;
        }
        if let Some(v) = get("REQUIRE_BOUNDED_RUNS") {
            self.limits.require_bounded_runs = parse_flag("REQUIRE_BOUNDED_RUNS", &v)?;
        }
        if let Some(v) = get("ALLOW_NETWORK") {
            self.gates.allow_network = parse_flag("ALLOW_NETWORK", &v)?;
        }
        if let Some(v) = get("ALLOW_DATABASE") {
            self.gates.allow_database = parse_flag("ALLOW_DATABASE", &v)?;
        }
        if let Some(v) = get("INCLUDE_TRACEBACKS") {
            self.debug.include_tracebacks = parse_flag("INCLUDE_TRACEBACKS", &v)?;
        }
        if let Some(v) = get("MAX_RUNS") {
            self.runs.max_runs = parse_number("MAX_RUNS", &v)?;
        }
        if let Some(v) = get("SNOWFAKERY_BIN") {
            self.engine.snowfakery_bin = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = Some(v);
        }
        Ok(())
    }

    /// Workspace root as configured, or the current directory
    pub fn workspace_root(&self) -> Result<PathBuf> {
        match &self.workspace_root {
            Some(root) => Ok(expand_home(root)),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| eyre!("{}{} must be a non-negative integer, got '{}'", ENV_PREFIX, name, value))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(eyre!("{}{} must be a boolean, got '{}'", ENV_PREFIX, name, other)),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.limits.timeout_seconds, 30);
        assert_eq!(config.limits.max_capture_chars, 20_000);
        assert_eq!(config.limits.max_reps, 10);
        assert_eq!(config.limits.max_target_count, 1_000);
        assert!(!config.gates.allow_network);
        assert!(!config.gates.allow_database);
        assert_eq!(config.runs.max_runs, 100);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "limits:\n  max_reps: 3\ngates:\n  allow_network: true\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limits.max_reps, 3);
        assert_eq!(config.limits.timeout_seconds, 30);
        assert!(config.gates.allow_network);
        assert!(!config.gates.allow_database);
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("SNOWFAKERY_MCP_TIMEOUT_SECONDS", "5"),
                ("SNOWFAKERY_MCP_MAX_REPS", "2"),
                ("SNOWFAKERY_MCP_ALLOW_DATABASE", "true"),
                ("SNOWFAKERY_MCP_REQUIRE_BOUNDED_RUNS", "1"),
                ("SNOWFAKERY_MCP_WORKSPACE_ROOT", "/srv/recipes"),
            ]))
            .unwrap();

        assert_eq!(config.limits.timeout_seconds, 5);
        assert_eq!(config.limits.max_reps, 2);
        assert!(config.gates.allow_database);
        assert!(config.limits.require_bounded_runs);
        assert_eq!(config.workspace_root, Some(PathBuf::from("/srv/recipes")));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup(&[("SNOWFAKERY_MCP_MAX_REPS", "lots")]));
        assert!(result.is_err());

        let result = config.apply_overrides(lookup(&[("SNOWFAKERY_MCP_ALLOW_NETWORK", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[("SNOWFAKERY_MCP_MAX_REPS", "  ")]))
            .unwrap();
        assert_eq!(config.limits.max_reps, 10);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snowfakery-mcp.yml");
        fs::write(&path, "runs:\n  max_runs: 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.runs.max_runs, 7);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/snowfakery-mcp.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}

//! Run registry and artifact access
//!
//! A run is registered once, after its producing tool finishes, and is never
//! mutated afterwards. The registry keeps the newest `max_runs` runs; the
//! oldest is evicted (and its directory removed) when that is exceeded.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, SnowfakeryMcpError, ToolError};
use crate::id::is_valid_run_id;
use crate::sandbox::safe_relpath;

pub const RUNS_URI_PREFIX: &str = "snowfakery://runs/";

pub fn run_uri(run_id: &str, artifact: &str) -> String {
    format!("{}{}/{}", RUNS_URI_PREFIX, run_id, artifact)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub tool: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub dir: PathBuf,
    /// Top-level artifact names in the run directory
    pub artifacts: Vec<String>,
}

impl RunRecord {
    /// Record for `dir`, listing whatever artifacts it currently holds
    pub async fn capture(id: &str, tool: &str, status: RunStatus, dir: &Path) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            tool: tool.to_string(),
            status,
            created_at: Utc::now(),
            dir: dir.to_path_buf(),
            artifacts: list_dir(dir).await?,
        })
    }

    pub fn uri(&self, artifact: &str) -> String {
        run_uri(&self.id, artifact)
    }

    /// Resource URIs for every artifact
    pub fn resources(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| self.uri(a)).collect()
    }

    pub fn has_artifact(&self, name: &str) -> bool {
        self.artifacts.iter().any(|a| a == name)
    }
}

/// Content of one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Text(String),
    Binary(Vec<u8>),
    /// A directory artifact: relative file names
    Listing(Vec<String>),
}

#[derive(Debug, Default)]
struct Registry {
    runs: HashMap<String, RunRecord>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct RunRegistry {
    inner: RwLock<Registry>,
    max_runs: usize,
}

impl RunRegistry {
    pub fn new(max_runs: usize) -> Self {
        Self {
            inner: RwLock::new(Registry::default()),
            max_runs: max_runs.max(1),
        }
    }

    /// Register a finished run. Registering an id twice is an error.
    pub async fn register(&self, record: RunRecord) -> Result<()> {
        let evicted = {
            let mut registry = self.inner.write().await;
            if registry.runs.contains_key(&record.id) {
                return Err(SnowfakeryMcpError::Registry(format!("Run {} is already registered", record.id)));
            }
            log::debug!("Registering {} ({:?}, {} artifacts)", record.id, record.status, record.artifacts.len());
            registry.order.push_back(record.id.clone());
            registry.runs.insert(record.id.clone(), record);

            let mut evicted = Vec::new();
            while registry.order.len() > self.max_runs {
                if let Some(oldest) = registry.order.pop_front()
                    && let Some(run) = registry.runs.remove(&oldest)
                {
                    evicted.push(run);
                }
            }
            evicted
        };

        for run in evicted {
            log::info!("Evicting {}", run.id);
            if let Err(e) = tokio::fs::remove_dir_all(&run.dir).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log::warn!("Failed to remove {}: {}", run.dir.display(), e);
            }
        }
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.inner.read().await.runs.get(run_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.runs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run ids, oldest first
    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.order.iter().cloned().collect()
    }

    /// Read `artifact` of `run_id`. Nested paths inside a directory artifact
    /// (`csv/Account.csv`) are allowed.
    pub async fn read_artifact(&self, run_id: &str, artifact: &str) -> std::result::Result<ArtifactContent, ToolError> {
        if !is_valid_run_id(run_id) {
            return Err(ToolError::not_found(format!("Unknown run: {}", run_id)));
        }
        let relative = safe_relpath(artifact)?;
        let top = artifact.split('/').next().unwrap_or(artifact);

        let run = self
            .get(run_id)
            .await
            .ok_or_else(|| ToolError::not_found(format!("Unknown run: {}", run_id)))?;
        if !run.has_artifact(top) {
            return Err(ToolError::not_found(format!("Run {} has no artifact {}", run_id, artifact)));
        }

        let missing = |e: std::io::Error| ToolError::not_found(format!("Cannot read {}/{}: {}", run_id, artifact, e));
        let run_dir = tokio::fs::canonicalize(&run.dir).await.map_err(missing)?;
        let path = tokio::fs::canonicalize(run.dir.join(relative)).await.map_err(missing)?;
        if !path.starts_with(&run_dir) {
            return Err(ToolError::containment(format!("Artifact resolves outside its run: {}", artifact)));
        }

        let metadata = tokio::fs::metadata(&path).await.map_err(missing)?;
        if metadata.is_dir() {
            return list_dir(&path)
                .await
                .map(ArtifactContent::Listing)
                .map_err(|e| ToolError::runtime(e.to_string()));
        }

        let bytes = tokio::fs::read(&path).await.map_err(missing)?;
        if is_binary_name(artifact) {
            return Ok(ArtifactContent::Binary(bytes));
        }
        match String::from_utf8(bytes) {
            Ok(text) => Ok(ArtifactContent::Text(text)),
            Err(e) => Ok(ArtifactContent::Binary(e.into_bytes())),
        }
    }
}

pub fn mime_type(artifact: &str) -> &'static str {
    match artifact.rsplit_once('.').map(|(_, ext)| ext) {
        Some("json") => "application/json",
        Some("yml") | Some("yaml") => "application/yaml",
        Some("csv") => "text/csv",
        Some("sql") => "application/sql",
        Some("dot") => "text/vnd.graphviz",
        Some("svg") => "image/svg+xml",
        Some("svgz") => "image/svg+xml-compressed",
        Some("png") => "image/png",
        Some("jpeg") | Some("jpg") => "image/jpeg",
        Some("ps") => "application/postscript",
        _ => "text/plain",
    }
}

fn is_binary_name(artifact: &str) -> bool {
    matches!(
        artifact.rsplit_once('.').map(|(_, ext)| ext),
        Some("png") | Some("jpeg") | Some("jpg") | Some("svgz") | Some("ps")
    )
}

async fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}

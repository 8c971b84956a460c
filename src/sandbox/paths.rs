//! Workspace path containment
//!
//! Every caller-supplied path goes through two checks: a lexical pass that
//! never touches the filesystem (rejects `..`, foreign absolute paths, NUL
//! bytes), then canonicalisation with a second containment check so symlinks
//! cannot escape the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{SnowfakeryMcpError, ToolError};

const STATE_DIR: &str = ".snowfakery-mcp";

/// Workspace root and derived locations
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    /// Root as configured (absolute, not canonicalised)
    root: PathBuf,
    /// Canonical form of `root`
    canonical_root: PathBuf,
}

impl WorkspacePaths {
    /// Build from a configured root; the directory must exist.
    pub fn new(root: impl AsRef<Path>) -> crate::error::Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let canonical_root = absolute.canonicalize().map_err(|e| {
            SnowfakeryMcpError::Config(format!("Workspace root {} is not accessible: {}", absolute.display(), e))
        })?;
        if !canonical_root.is_dir() {
            return Err(SnowfakeryMcpError::Config(format!(
                "Workspace root {} is not a directory",
                canonical_root.display()
            )));
        }
        Ok(Self {
            root: absolute,
            canonical_root,
        })
    }

    /// Canonical workspace root
    pub fn root(&self) -> &Path {
        &self.canonical_root
    }

    /// Directory holding per-run artifact directories
    pub fn runs_root(&self) -> PathBuf {
        self.canonical_root.join(STATE_DIR).join("runs")
    }

    /// Directory for short-lived files (validate-only recipe copies)
    pub fn scratch_root(&self) -> PathBuf {
        self.canonical_root.join(STATE_DIR).join("scratch")
    }

    /// Lexically resolve `candidate` against the root without touching the
    /// filesystem.
    pub fn contain_lexically(&self, candidate: &str) -> Result<PathBuf, ToolError> {
        if candidate.trim().is_empty() {
            return Err(ToolError::validation("path must not be empty"));
        }
        if candidate.contains('\0') {
            return Err(ToolError::containment("path must not contain NUL bytes"));
        }

        let path = Path::new(candidate);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.canonical_root)
                .or_else(|_| path.strip_prefix(&self.root))
                .map_err(|_| {
                    ToolError::containment(format!("Path is outside workspace root: {}", candidate))
                })?
        } else {
            path
        };

        let mut resolved = self.canonical_root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ToolError::containment(format!(
                        "Path traversal is not allowed: {}",
                        candidate
                    )));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::containment(format!(
                        "Path is outside workspace root: {}",
                        candidate
                    )));
                }
            }
        }
        Ok(resolved)
    }

    /// Resolve an existing file inside the workspace.
    pub fn resolve_existing(&self, candidate: &str) -> Result<PathBuf, ToolError> {
        let lexical = self.contain_lexically(candidate)?;
        let canonical = lexical
            .canonicalize()
            .map_err(|e| ToolError::not_found(format!("Cannot open '{}': {}", candidate, e)))?;
        if !canonical.starts_with(&self.canonical_root) {
            return Err(ToolError::containment(format!(
                "Path resolves outside workspace root: {}",
                candidate
            )));
        }
        Ok(canonical)
    }

    /// Resolve `candidate` relative to `base` (itself inside the workspace),
    /// keeping the result inside both.
    pub fn resolve_within(&self, base: &Path, candidate: &str) -> Result<PathBuf, ToolError> {
        let rel = safe_relpath(candidate)?;
        let joined = base.join(rel);
        let canonical = joined
            .canonicalize()
            .map_err(|e| ToolError::not_found(format!("Cannot open '{}': {}", candidate, e)))?;
        let base_canonical = base
            .canonicalize()
            .map_err(|e| ToolError::not_found(format!("Cannot open '{}': {}", base.display(), e)))?;
        if !canonical.starts_with(&base_canonical) || !canonical.starts_with(&self.canonical_root) {
            return Err(ToolError::containment(format!(
                "Path resolves outside allowed directory: {}",
                candidate
            )));
        }
        Ok(canonical)
    }

    /// Path relative to the root, `/`-separated, for display
    pub fn display_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.canonical_root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| path.display().to_string())
    }
}

/// Validate a caller-supplied relative name for bundled or nested content.
pub fn safe_relpath(name: &str) -> Result<PathBuf, ToolError> {
    if name.is_empty() {
        return Err(ToolError::validation("name must not be empty"));
    }
    if name.contains('\0') || name.contains('\\') {
        return Err(ToolError::containment(format!("Invalid characters in name: {}", name)));
    }
    if name.starts_with('/') {
        return Err(ToolError::containment("name must be a relative path"));
    }
    let mut out = PathBuf::new();
    for part in name.split('/') {
        match part {
            "" => return Err(ToolError::containment("name must not contain empty segments")),
            ".." => return Err(ToolError::containment("name must not contain '..'")),
            "." => {}
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ToolError::validation("name must not be empty"));
    }
    Ok(out)
}

//! Recipe loading and static analysis
//!
//! Everything here works on the recipe text alone; nothing in this module
//! runs the engine.

pub mod analyze;
pub mod check;
pub mod format;
pub mod locate;
pub mod mapping;
pub mod model;

use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use analyze::{DependencyPlan, RecipeSummary, dependency_order, summarize};
pub use check::{StaticReport, parse_yaml, static_check};
pub use format::{Formatted, format_recipe};
pub use mapping::{LoadDeclaration, MappingPlan, build_mapping, parse_declarations};
pub use model::{ObjectTemplate, Recipe, Reference, ReferenceKind};

use crate::error::ToolError;
use crate::sandbox::WorkspacePaths;

/// Name shown in locations for inline recipes
pub const INLINE_RECIPE_NAME: &str = "<recipe_text>";

/// Caller-facing recipe source arguments, shared by every recipe tool
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeArgs {
    #[serde(default)]
    pub recipe_path: Option<String>,
    #[serde(default)]
    pub recipe_text: Option<String>,
}

/// Where a recipe comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeSource {
    Inline(String),
    Path(String),
}

impl RecipeSource {
    /// Exactly one of `path` or `text` must be non-empty.
    pub fn from_parts(path: Option<&str>, text: Option<&str>) -> Result<Self, ToolError> {
        let path = path.filter(|p| !p.is_empty());
        let text = text.filter(|t| !t.is_empty());
        match (path, text) {
            (Some(p), None) => Ok(RecipeSource::Path(p.to_string())),
            (None, Some(t)) => Ok(RecipeSource::Inline(t.to_string())),
            _ => Err(ToolError::validation("Provide exactly one of recipe_path or recipe_text")),
        }
    }

    /// Read the recipe, enforcing workspace containment for paths.
    ///
    /// The lexical check runs before any filesystem access.
    pub fn load(&self, paths: &WorkspacePaths) -> Result<LoadedRecipe, ToolError> {
        match self {
            RecipeSource::Inline(text) => Ok(LoadedRecipe {
                text: text.clone(),
                path: None,
                display_name: INLINE_RECIPE_NAME.to_string(),
                base_dir: None,
            }),
            RecipeSource::Path(candidate) => {
                paths.contain_lexically(candidate)?;
                let resolved = paths.resolve_existing(candidate)?;
                if !resolved.is_file() {
                    return Err(ToolError::not_found(format!("Recipe is not a file: {}", candidate)));
                }
                let text = std::fs::read_to_string(&resolved)
                    .map_err(|e| ToolError::validation(format!("Cannot read recipe '{}': {}", candidate, e)))?;
                let base_dir = Some(
                    resolved
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| paths.root().to_path_buf()),
                );
                Ok(LoadedRecipe {
                    text,
                    display_name: paths.display_relative(&resolved),
                    path: Some(resolved),
                    base_dir,
                })
            }
        }
    }
}

impl RecipeArgs {
    pub fn source(&self) -> Result<RecipeSource, ToolError> {
        RecipeSource::from_parts(self.recipe_path.as_deref(), self.recipe_text.as_deref())
    }
}

/// A recipe read into memory
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
    pub text: String,
    /// Canonical file path for path sources
    pub path: Option<PathBuf>,
    /// Workspace-relative path, or `<recipe_text>`
    pub display_name: String,
    /// Directory `include_file` statements resolve against. Inline recipes
    /// have none: the engine reads them from a fresh snapshot directory.
    pub base_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_source_requires_exactly_one() {
        assert!(RecipeSource::from_parts(None, None).is_err());
        assert!(RecipeSource::from_parts(Some("a.yml"), Some("- object: A")).is_err());
        assert!(RecipeSource::from_parts(Some(""), None).is_err());
        assert_eq!(
            RecipeSource::from_parts(Some(""), Some("- object: A")).unwrap(),
            RecipeSource::Inline("- object: A".to_string())
        );
    }

    #[test]
    fn test_load_path_inside_workspace() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("recipes")).unwrap();
        std::fs::write(dir.path().join("recipes/a.yml"), "- object: A\n").unwrap();
        let paths = WorkspacePaths::new(dir.path()).unwrap();

        let loaded = RecipeSource::Path("recipes/a.yml".into()).load(&paths).unwrap();
        assert_eq!(loaded.text, "- object: A\n");
        assert_eq!(loaded.display_name, "recipes/a.yml");
        assert!(loaded.base_dir.unwrap().ends_with("recipes"));
    }

    #[test]
    fn test_inline_has_no_include_base() {
        let dir = tempdir().unwrap();
        let paths = WorkspacePaths::new(dir.path()).unwrap();
        let loaded = RecipeSource::Inline("- object: A\n".into()).load(&paths).unwrap();
        assert!(loaded.base_dir.is_none());
        assert_eq!(loaded.display_name, INLINE_RECIPE_NAME);
    }

    #[test]
    fn test_load_rejects_traversal() {
        let dir = tempdir().unwrap();
        let paths = WorkspacePaths::new(dir.path()).unwrap();
        let err = RecipeSource::Path("../x.yml".into()).load(&paths).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathContainment);
    }

    #[test]
    fn test_load_directory_is_not_found() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("recipes")).unwrap();
        let paths = WorkspacePaths::new(dir.path()).unwrap();
        let err = RecipeSource::Path("recipes".into()).load(&paths).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}

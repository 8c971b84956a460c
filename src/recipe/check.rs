//! Static validation: YAML syntax, statement shape, undeclared references

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use super::LoadedRecipe;
use super::model::Recipe;
use crate::error::{ErrorKind, ToolError};
use crate::sandbox::{WorkspacePaths, safe_relpath};

/// Nesting limit for `include_file` chains
const MAX_INCLUDE_DEPTH: usize = 8;

/// Outcome of the static pass
#[derive(Debug, Default)]
pub struct StaticReport {
    pub errors: Vec<ToolError>,
    /// Model with includes folded in, when the recipe parsed
    pub recipe: Option<Recipe>,
    /// Parsed YAML of the top-level recipe
    pub value: Option<Value>,
    /// Parsed YAML of every included file reached, keyed by display name
    pub included: Vec<(String, Value)>,
    /// False when an include could not be read, so references were not checked
    pub references_checked: bool,
    pub notes: Vec<String>,
}

impl StaticReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse YAML, mapping failures to a located syntax error.
pub fn parse_yaml(text: &str, filename: &str) -> Result<Value, ToolError> {
    serde_yaml::from_str::<Value>(text).map_err(|e| {
        let message = format!("Invalid YAML: {}", e);
        match e.location() {
            Some(loc) => ToolError::syntax(message).at(filename, Some(loc.line()), Some(loc.column())),
            None => ToolError::syntax(message).at(filename, None, None),
        }
    })
}

/// Run every static check on a loaded recipe.
pub fn static_check(loaded: &LoadedRecipe, paths: &WorkspacePaths) -> StaticReport {
    let mut report = StaticReport::default();

    let value = match parse_yaml(&loaded.text, &loaded.display_name) {
        Ok(v) => v,
        Err(e) => {
            report.errors.push(e);
            return report;
        }
    };

    let mut recipe = match Recipe::from_value(&value, &loaded.text) {
        Ok(r) => r,
        Err(e) => {
            report.errors.push(with_file(e, &loaded.display_name));
            report.value = Some(value);
            return report;
        }
    };

    let mut visited = HashSet::new();
    if let Some(path) = &loaded.path {
        visited.insert(path.clone());
    }
    let includes_ok = fold_includes(
        &mut recipe,
        loaded.base_dir.as_deref(),
        paths,
        &mut visited,
        0,
        &mut report,
    );

    if includes_ok {
        report.references_checked = true;
        report.errors.extend(undeclared_references(&recipe, &loaded.display_name));
    } else {
        report
            .notes
            .push("Reference check skipped: an include_file could not be read".to_string());
    }

    report.recipe = Some(recipe);
    report.value = Some(value);
    report
}

/// References whose target is neither a declared table nor a nickname
pub fn undeclared_references(recipe: &Recipe, filename: &str) -> Vec<ToolError> {
    let mut known: HashSet<&str> = recipe.tables().into_iter().collect();
    known.extend(recipe.nicknames().into_keys());

    recipe
        .objects
        .iter()
        .flat_map(|o| o.references.iter())
        .filter(|r| !known.contains(r.target.as_str()))
        .map(|r| {
            ToolError::validation(format!(
                "{} to undeclared object or nickname '{}'",
                match r.kind {
                    super::ReferenceKind::Reference => "Reference",
                    super::ReferenceKind::RandomReference => "Random reference",
                },
                r.target
            ))
            .at(filename, r.line, None)
        })
        .collect()
}

fn fold_includes(
    recipe: &mut Recipe,
    base_dir: Option<&Path>,
    paths: &WorkspacePaths,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
    report: &mut StaticReport,
) -> bool {
    if recipe.include_files.is_empty() {
        return true;
    }
    if depth >= MAX_INCLUDE_DEPTH {
        report.errors.push(ToolError::validation("include_file nesting is too deep"));
        return false;
    }

    let mut ok = true;
    for include in recipe.include_files.clone() {
        let Some(base_dir) = base_dir else {
            // Inline recipes run from a fresh snapshot directory holding nothing else
            match safe_relpath(&include) {
                Err(e) if e.kind == ErrorKind::PathContainment => report.errors.push(e),
                _ => report.notes.push(format!(
                    "include_file '{}' cannot be resolved from recipe_text; pass the recipe as recipe_path",
                    include
                )),
            }
            ok = false;
            continue;
        };
        let resolved = match paths.resolve_within(base_dir, &include) {
            Ok(p) => p,
            Err(e) if e.kind == ErrorKind::PathContainment => {
                report.errors.push(e);
                ok = false;
                continue;
            }
            Err(e) => {
                log::debug!("include_file '{}' unavailable: {}", include, e.message);
                ok = false;
                continue;
            }
        };
        if !visited.insert(resolved.clone()) {
            continue;
        }
        let display = paths.display_relative(&resolved);
        let text = match std::fs::read_to_string(&resolved) {
            Ok(t) => t,
            Err(e) => {
                log::debug!("include_file '{}' unreadable: {}", display, e);
                ok = false;
                continue;
            }
        };
        let value = match parse_yaml(&text, &display) {
            Ok(v) => v,
            Err(e) => {
                report.errors.push(e);
                ok = false;
                continue;
            }
        };
        let included = Recipe::from_value(&value, &text).map_err(|e| with_file(e, &display));
        report.included.push((display, value));
        match included {
            Ok(mut inner) => {
                let inner_base = resolved.parent().unwrap_or(base_dir);
                ok &= fold_includes(&mut inner, Some(inner_base), paths, visited, depth + 1, report);
                recipe.absorb(inner);
            }
            Err(e) => {
                report.errors.push(e);
                ok = false;
            }
        }
    }
    ok
}

fn with_file(mut err: ToolError, filename: &str) -> ToolError {
    if err.filename.is_none() {
        err.filename = Some(filename.to_string());
    }
    err
}

//! Static resource catalog
//!
//! Loaded once at startup. Each category (schema, docs, examples) comes from
//! a vendored Snowfakery checkout under the workspace root when one exists,
//! otherwise from the copy compiled into the binary. Templates are only
//! available from a vendored recipe-templates checkout.

mod bundled;
pub mod discovery;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, SnowfakeryMcpError, ToolError};
use crate::sandbox::{WorkspacePaths, safe_relpath};

pub const URI_SCHEME: &str = "snowfakery://";
pub const SCHEMA_URI: &str = "snowfakery://schema/recipe-jsonschema";
pub const EXAMPLES_LIST_URI: &str = "snowfakery://examples/list";
pub const TEMPLATES_LIST_URI: &str = "snowfakery://templates/list";
pub const PROVIDERS_URI: &str = "snowfakery://providers/list";
pub const PLUGINS_URI: &str = "snowfakery://plugins/list";
pub const FORMATS_URI: &str = "snowfakery://formats/info";

const VENDORED_DIR: &str = "Snowfakery";
const TEMPLATES_DIR: &str = "Snowfakery-Recipe-Templates/snowfakery_samples";
const SCHEMA_FILE: &str = "schema/snowfakery_recipe.jsonschema.json";

/// Keyed docs: (uri key, path relative to the docs directory)
const DOC_KEYS: &[(&str, &str)] = &[
    ("index", "index.md"),
    ("extending", "extending.md"),
    ("salesforce", "salesforce.md"),
    ("architecture", "arch/ArchIndex.md"),
    ("embedding", "embedding.md"),
];

const SNIPPET_CHARS: usize = 200;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A named text document with its digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub text: String,
    pub sha256: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            name: name.into(),
            sha256: sha256_hex(text.as_bytes()),
            text,
        }
    }
}

/// A fixed-URI resource listed by `resources/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticEntry {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
    #[serde(skip)]
    pub text: String,
    #[serde(skip)]
    pub sha256: String,
}

impl StaticEntry {
    fn new(uri: &str, description: &str, mime_type: &str, text: String) -> Self {
        Self {
            uri: uri.to_string(),
            name: uri.trim_start_matches(URI_SCHEME).to_string(),
            description: description.to_string(),
            mime_type: mime_type.to_string(),
            sha256: sha256_hex(text.as_bytes()),
            text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentOrigin {
    Bundled,
    Vendored,
    Absent,
}

/// One match from `search_docs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocHit {
    pub doc: String,
    pub line: usize,
    pub snippet: String,
}

#[derive(Debug)]
pub struct StaticCatalog {
    schema: StaticEntry,
    entries: BTreeMap<String, StaticEntry>,
    docs: Vec<Document>,
    examples: BTreeMap<String, Document>,
    templates: BTreeMap<String, Document>,
    origins: BTreeMap<&'static str, ContentOrigin>,
}

impl StaticCatalog {
    /// Load from the workspace, preferring vendored content per category.
    pub fn load(paths: &WorkspacePaths) -> Result<Self> {
        let root = paths.root();
        let vendored = contained_dir(root, &root.join(VENDORED_DIR));

        let schema_file = vendored.as_ref().map(|d| d.join(SCHEMA_FILE)).filter(|p| p.is_file());
        let schema = match schema_file {
            Some(path) => {
                log::info!("Using vendored schema {}", path.display());
                (read_contained(root, &path)?, ContentOrigin::Vendored)
            }
            None => (bundled::SCHEMA.to_string(), ContentOrigin::Bundled),
        };

        let docs = match vendored.as_ref().and_then(|d| contained_dir(root, &d.join("docs"))) {
            Some(dir) => (collect_files(root, &dir, "md")?, ContentOrigin::Vendored),
            None => (bundled_pairs(bundled::DOCS), ContentOrigin::Bundled),
        };

        let examples = match vendored.as_ref().and_then(|d| contained_dir(root, &d.join("examples"))) {
            Some(dir) => (collect_files(root, &dir, "yml")?, ContentOrigin::Vendored),
            None => (bundled_pairs(bundled::EXAMPLES), ContentOrigin::Bundled),
        };

        let templates = match contained_dir(root, &root.join(TEMPLATES_DIR)) {
            Some(dir) => (collect_files(root, &dir, "yml")?, ContentOrigin::Vendored),
            None => (Vec::new(), ContentOrigin::Absent),
        };

        Self::assemble(schema, docs, examples, templates)
    }

    /// Catalog built purely from the compiled-in content
    pub fn bundled() -> Result<Self> {
        Self::assemble(
            (bundled::SCHEMA.to_string(), ContentOrigin::Bundled),
            (bundled_pairs(bundled::DOCS), ContentOrigin::Bundled),
            (bundled_pairs(bundled::EXAMPLES), ContentOrigin::Bundled),
            (Vec::new(), ContentOrigin::Absent),
        )
    }

    fn assemble(
        schema: (String, ContentOrigin),
        docs: (Vec<(String, String)>, ContentOrigin),
        examples: (Vec<(String, String)>, ContentOrigin),
        templates: (Vec<(String, String)>, ContentOrigin),
    ) -> Result<Self> {
        serde_json::from_str::<serde_json::Value>(&schema.0)
            .map_err(|e| SnowfakeryMcpError::Catalog(format!("Recipe schema is not valid JSON: {}", e)))?;
        serde_json::from_str::<serde_json::Value>(bundled::PROVIDERS)
            .map_err(|e| SnowfakeryMcpError::Catalog(format!("Provider catalogue is not valid JSON: {}", e)))?;
        if examples.0.is_empty() {
            return Err(SnowfakeryMcpError::Catalog("No example recipes found".to_string()));
        }

        let mut origins = BTreeMap::new();
        origins.insert("schema", schema.1);
        origins.insert("docs", docs.1);
        origins.insert("examples", examples.1);
        origins.insert("templates", templates.1);

        let docs: Vec<Document> = docs.0.into_iter().map(|(n, t)| Document::new(n, t)).collect();
        let examples: BTreeMap<String, Document> = examples
            .0
            .into_iter()
            .map(|(n, t)| (n.clone(), Document::new(n, t)))
            .collect();
        let templates: BTreeMap<String, Document> = templates
            .0
            .into_iter()
            .map(|(n, t)| (n.clone(), Document::new(n, t)))
            .collect();

        let schema = StaticEntry::new(
            SCHEMA_URI,
            "JSON Schema for Snowfakery recipes",
            "application/schema+json",
            schema.0,
        );

        let mut entries = BTreeMap::new();
        entries.insert(schema.uri.clone(), schema.clone());

        for (key, relpath) in DOC_KEYS {
            match docs.iter().find(|d| d.name == *relpath) {
                Some(doc) => {
                    let uri = format!("{}docs/{}", URI_SCHEME, key);
                    let entry = StaticEntry::new(
                        &uri,
                        &format!("Snowfakery documentation: {}", key),
                        "text/markdown",
                        doc.text.clone(),
                    );
                    entries.insert(uri, entry);
                }
                None => log::warn!("Documentation page {} not found; {} is unavailable", relpath, key),
            }
        }

        let example_list = serde_json::json!({ "examples": examples.keys().collect::<Vec<_>>() });
        entries.insert(
            EXAMPLES_LIST_URI.to_string(),
            StaticEntry::new(
                EXAMPLES_LIST_URI,
                "Names of the example recipes",
                "application/json",
                serde_json::to_string_pretty(&example_list)?,
            ),
        );

        let mut template_list = serde_json::json!({ "templates": templates.keys().collect::<Vec<_>>() });
        if origins.get("templates") == Some(&ContentOrigin::Absent) {
            template_list["note"] = serde_json::Value::String(format!(
                "No recipe templates installed; clone Snowfakery-Recipe-Templates into the workspace root to enable {}",
                TEMPLATES_DIR
            ));
        }
        entries.insert(
            TEMPLATES_LIST_URI.to_string(),
            StaticEntry::new(
                TEMPLATES_LIST_URI,
                "Paths of the recipe templates",
                "application/json",
                serde_json::to_string_pretty(&template_list)?,
            ),
        );

        entries.insert(
            PROVIDERS_URI.to_string(),
            StaticEntry::new(
                PROVIDERS_URI,
                "Faker providers available to fake: fields",
                "application/json",
                bundled::PROVIDERS.to_string(),
            ),
        );
        entries.insert(
            PLUGINS_URI.to_string(),
            StaticEntry::new(
                PLUGINS_URI,
                "Built-in Snowfakery plugins",
                "application/json",
                serde_json::to_string_pretty(&discovery::plugins_document())?,
            ),
        );
        entries.insert(
            FORMATS_URI.to_string(),
            StaticEntry::new(
                FORMATS_URI,
                "Supported output formats",
                "application/json",
                serde_json::to_string_pretty(&discovery::formats_document())?,
            ),
        );

        log::info!(
            "Catalog loaded: {} docs, {} examples, {} templates",
            docs.len(),
            examples.len(),
            templates.len()
        );

        Ok(Self {
            schema,
            entries,
            docs,
            examples,
            templates,
            origins,
        })
    }

    pub fn schema(&self) -> &StaticEntry {
        &self.schema
    }

    /// Fixed-URI entries in URI order
    pub fn entries(&self) -> impl Iterator<Item = &StaticEntry> {
        self.entries.values()
    }

    pub fn entry(&self, uri: &str) -> Option<&StaticEntry> {
        self.entries.get(uri)
    }

    pub fn origins(&self) -> &BTreeMap<&'static str, ContentOrigin> {
        &self.origins
    }

    pub fn example_names(&self) -> impl Iterator<Item = &str> {
        self.examples.keys().map(String::as_str)
    }

    pub fn example(&self, name: &str) -> std::result::Result<&Document, ToolError> {
        safe_relpath(name)?;
        self.examples
            .get(name)
            .ok_or_else(|| ToolError::not_found(format!("Unknown example: {}", name)))
    }

    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn template(&self, path: &str) -> std::result::Result<&Document, ToolError> {
        safe_relpath(path)?;
        self.templates
            .get(path)
            .ok_or_else(|| ToolError::not_found(format!("Unknown template: {}", path)))
    }

    /// Case-insensitive substring search over every documentation page.
    ///
    /// Returns at most `limit` hits and whether more were available.
    pub fn search_docs(&self, query: &str, limit: usize) -> (Vec<DocHit>, bool) {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for doc in &self.docs {
            for (idx, line) in doc.text.lines().enumerate() {
                if !line.to_lowercase().contains(&needle) {
                    continue;
                }
                if hits.len() == limit {
                    return (hits, true);
                }
                hits.push(DocHit {
                    doc: doc.name.clone(),
                    line: idx + 1,
                    snippet: line.trim().chars().take(SNIPPET_CHARS).collect(),
                });
            }
        }
        (hits, false)
    }
}

fn bundled_pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = items.iter().map(|(n, t)| (n.to_string(), t.to_string())).collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

/// `dir` if it is a directory whose canonical form stays under `root`
fn contained_dir(root: &Path, dir: &Path) -> Option<std::path::PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    match dir.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Some(canonical),
        Ok(canonical) => {
            log::warn!("Ignoring {}: resolves outside the workspace ({})", dir.display(), canonical.display());
            None
        }
        Err(e) => {
            log::warn!("Ignoring {}: {}", dir.display(), e);
            None
        }
    }
}

fn read_contained(root: &Path, path: &Path) -> Result<String> {
    let canonical = path.canonicalize()?;
    if !canonical.starts_with(root) {
        return Err(SnowfakeryMcpError::Catalog(format!(
            "{} resolves outside the workspace",
            path.display()
        )));
    }
    Ok(std::fs::read_to_string(canonical)?)
}

/// All `*.<extension>` files under `dir`, keyed by `/`-separated relative path
fn collect_files(root: &Path, dir: &Path, extension: &str) -> Result<Vec<(String, String)>> {
    let pattern = format!("{}/**/*.{}", glob::Pattern::escape(&dir.to_string_lossy()), extension);
    let entries = glob::glob(&pattern)
        .map_err(|e| SnowfakeryMcpError::Catalog(format!("Invalid pattern {}: {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match read_contained(root, &path) {
            Ok(text) => files.push((name, text)),
            Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

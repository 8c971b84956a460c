//! `snowfakery://` resources
//!
//! Fixed entries come from the static catalog; examples, templates and run
//! artifacts are addressed through URI templates.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Value, json};

use crate::catalog::URI_SCHEME;
use crate::error::ToolError;
use crate::runs::{ArtifactContent, mime_type};
use crate::tools::ToolContext;

pub const EXAMPLE_TEMPLATE: &str = "snowfakery://examples/{name}";
pub const TEMPLATE_TEMPLATE: &str = "snowfakery://templates/{path}";
pub const RUN_ARTIFACT_TEMPLATE: &str = "snowfakery://runs/{run_id}/{artifact}";

/// Every URI template, in listing order
pub const URI_TEMPLATES: &[&str] = &[EXAMPLE_TEMPLATE, TEMPLATE_TEMPLATE, RUN_ARTIFACT_TEMPLATE];

/// A parsed resource URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Static(String),
    Example(String),
    Template(String),
    RunArtifact { run_id: String, artifact: String },
}

impl ResourceUri {
    pub fn parse(uri: &str) -> Result<Self, ToolError> {
        let rest = uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| ToolError::not_found(format!("Unknown resource: {}", uri)))?;

        if let Some(run) = rest.strip_prefix("runs/") {
            return match run.split_once('/') {
                Some((run_id, artifact)) if !run_id.is_empty() && !artifact.is_empty() => Ok(ResourceUri::RunArtifact {
                    run_id: run_id.to_string(),
                    artifact: artifact.to_string(),
                }),
                _ => Err(ToolError::not_found(format!("Unknown resource: {}", uri))),
            };
        }
        if let Some(name) = rest.strip_prefix("examples/")
            && name != "list"
        {
            return Ok(ResourceUri::Example(name.to_string()));
        }
        if let Some(path) = rest.strip_prefix("templates/")
            && path != "list"
        {
            return Ok(ResourceUri::Template(path.to_string()));
        }
        Ok(ResourceUri::Static(uri.to_string()))
    }
}

/// One entry of a `resources/read` result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContents {
    fn text(uri: &str, mime_type: &str, text: impl Into<String>) -> Self {
        Self {
            uri: uri.to_string(),
            mime_type: mime_type.to_string(),
            text: Some(text.into()),
            blob: None,
        }
    }

    fn blob(uri: &str, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            uri: uri.to_string(),
            mime_type: mime_type.to_string(),
            text: None,
            blob: Some(STANDARD.encode(bytes)),
        }
    }
}

/// `resources/list` result
pub fn list(ctx: &ToolContext) -> Value {
    let resources: Vec<Value> = ctx
        .catalog
        .entries()
        .map(|entry| json!(entry))
        .collect();
    json!({ "resources": resources })
}

/// `resources/templates/list` result
pub fn list_templates() -> Value {
    json!({
        "resourceTemplates": [
            {
                "uriTemplate": EXAMPLE_TEMPLATE,
                "name": "example",
                "description": "Example recipe by name (see snowfakery://examples/list)",
                "mimeType": "application/yaml",
            },
            {
                "uriTemplate": TEMPLATE_TEMPLATE,
                "name": "template",
                "description": "Recipe template by path (see snowfakery://templates/list)",
                "mimeType": "application/yaml",
            },
            {
                "uriTemplate": RUN_ARTIFACT_TEMPLATE,
                "name": "run-artifact",
                "description": "Artifact produced by a run_recipe, render_diagram or generate_mapping call",
            },
        ]
    })
}

/// Read one resource.
pub async fn read(ctx: &ToolContext, uri: &str) -> Result<ResourceContents, ToolError> {
    match ResourceUri::parse(uri)? {
        ResourceUri::Static(uri) => {
            let entry = ctx
                .catalog
                .entry(&uri)
                .ok_or_else(|| ToolError::not_found(format!("Unknown resource: {}", uri)))?;
            Ok(ResourceContents::text(&uri, &entry.mime_type, entry.text.clone()))
        }
        ResourceUri::Example(name) => {
            let doc = ctx.catalog.example(&name)?;
            Ok(ResourceContents::text(uri, "application/yaml", doc.text.clone()))
        }
        ResourceUri::Template(path) => {
            let doc = ctx.catalog.template(&path)?;
            Ok(ResourceContents::text(uri, "application/yaml", doc.text.clone()))
        }
        ResourceUri::RunArtifact { run_id, artifact } => {
            match ctx.runs.read_artifact(&run_id, &artifact).await? {
                ArtifactContent::Text(text) => Ok(ResourceContents::text(uri, mime_type(&artifact), ctx.scrub(&text))),
                ArtifactContent::Binary(bytes) => Ok(ResourceContents::blob(uri, mime_type(&artifact), &bytes)),
                ArtifactContent::Listing(files) => Ok(ResourceContents::text(
                    uri,
                    "application/json",
                    json!({ "files": files }).to_string(),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SCHEMA_URI;
    use crate::error::ErrorKind;
    use crate::sandbox::StoppingCriterion;
    use crate::tools::RunRequest;
    use crate::tools::context::testing::context;

    #[test]
    fn test_parse_uris() {
        assert_eq!(
            ResourceUri::parse("snowfakery://examples/salesforce/account.yml").unwrap(),
            ResourceUri::Example("salesforce/account.yml".into())
        );
        assert_eq!(
            ResourceUri::parse("snowfakery://examples/list").unwrap(),
            ResourceUri::Static("snowfakery://examples/list".into())
        );
        assert_eq!(
            ResourceUri::parse("snowfakery://runs/run-1-abc/csv/Account.csv").unwrap(),
            ResourceUri::RunArtifact {
                run_id: "run-1-abc".into(),
                artifact: "csv/Account.csv".into()
            }
        );
        assert_eq!(ResourceUri::parse("file:///etc/passwd").unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(ResourceUri::parse("snowfakery://runs/x").unwrap_err().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_has_static_entries() {
        let (_dir, ctx) = context();
        let listed = list(&ctx);
        let uris: Vec<&str> = listed["resources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["uri"].as_str().unwrap())
            .collect();
        assert!(uris.contains(&SCHEMA_URI));
        assert!(uris.contains(&"snowfakery://docs/index"));
        assert!(listed["resources"][0]["mimeType"].is_string());
        assert_eq!(list_templates()["resourceTemplates"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_read_schema_matches_catalog() {
        let (_dir, ctx) = context();
        let contents = read(&ctx, SCHEMA_URI).await.unwrap();
        assert_eq!(contents.text.as_deref(), Some(ctx.catalog.schema().text.as_str()));
        assert_eq!(contents.mime_type, "application/schema+json");
    }

    #[tokio::test]
    async fn test_read_run_artifacts() {
        let (_dir, ctx) = context();
        let recipe = crate::recipe::RecipeSource::Inline("- object: A\n".into())
            .load(&ctx.paths)
            .unwrap();
        let png = crate::tools::execute_run(
            &ctx,
            RunRequest::new("render_diagram", recipe.clone(), "png", StoppingCriterion::Reps { reps: 1 }),
        )
        .await
        .unwrap();
        let contents = read(&ctx, &png.record.uri("output.png")).await.unwrap();
        assert!(contents.text.is_none());
        assert_eq!(contents.mime_type, "image/png");
        assert!(!contents.blob.unwrap().is_empty());

        let csv = crate::tools::execute_run(
            &ctx,
            RunRequest::new("run_recipe", recipe, "csv", StoppingCriterion::Reps { reps: 1 }),
        )
        .await
        .unwrap();
        let listing = read(&ctx, &csv.record.uri("csv")).await.unwrap();
        let files: Value = serde_json::from_str(listing.text.as_deref().unwrap()).unwrap();
        assert_eq!(files["files"], json!(["A.csv"]));

        let nested = read(&ctx, &csv.record.uri("csv/A.csv")).await.unwrap();
        assert_eq!(nested.text.as_deref(), Some("id\n1\n"));
    }

    #[tokio::test]
    async fn test_read_errors() {
        let (_dir, ctx) = context();
        for uri in [
            "snowfakery://nothing/here",
            "snowfakery://examples/missing.yml",
            "snowfakery://runs/run-1-00000000/output.txt",
            "snowfakery://runs/not-a-run/output.txt",
        ] {
            assert_eq!(read(&ctx, uri).await.unwrap_err().kind, ErrorKind::NotFound, "{}", uri);
        }
        assert_eq!(
            read(&ctx, "snowfakery://examples/../secret").await.unwrap_err().kind,
            ErrorKind::PathContainment
        );
    }
}

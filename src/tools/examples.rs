//! list_examples and get_example tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args};
use crate::catalog::URI_SCHEME;
use crate::error::ToolError;

pub struct ListExamplesTool;

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    prefix: Option<String>,
}

#[async_trait]
impl Tool for ListExamplesTool {
    fn name(&self) -> &'static str {
        "list_examples"
    }

    fn description(&self) -> &'static str {
        "List example recipe names, optionally filtered by a path prefix."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prefix": {
                    "type": "string",
                    "description": "Only names starting with this prefix, e.g. salesforce/"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: ListArgs = parse_args(input)?;
        let prefix = args.prefix.unwrap_or_default();
        let examples: Vec<&str> = ctx
            .catalog
            .example_names()
            .filter(|name| name.starts_with(prefix.as_str()))
            .collect();
        Ok(ToolResult::success(json!({ "examples": examples })))
    }
}

pub struct GetExampleTool;

#[derive(Debug, Deserialize)]
struct GetArgs {
    name: String,
}

#[async_trait]
impl Tool for GetExampleTool {
    fn name(&self) -> &'static str {
        "get_example"
    }

    fn description(&self) -> &'static str {
        "Return the text of an example recipe with its resource URI and SHA-256 digest."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Example name as returned by list_examples"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: GetArgs = parse_args(input)?;
        let doc = ctx.catalog.example(&args.name)?;
        Ok(ToolResult::success(json!({
            "name": doc.name,
            "uri": format!("{}examples/{}", URI_SCHEME, doc.name),
            "text": doc.text,
            "sha256": doc.sha256,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::context::testing::context;

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_dir, ctx) = context();
        let all = ListExamplesTool.execute(json!({}), &ctx).await.unwrap();
        let sf = ListExamplesTool
            .execute(json!({"prefix": "salesforce/"}), &ctx)
            .await
            .unwrap();

        let all = all.structured["examples"].as_array().unwrap().len();
        let sf = sf.structured["examples"].as_array().unwrap();
        assert_eq!(sf.len(), 2);
        assert!(all > sf.len());
        assert!(sf.iter().all(|n| n.as_str().unwrap().starts_with("salesforce/")));
    }

    #[tokio::test]
    async fn test_get_example_is_byte_identical() {
        let (_dir, ctx) = context();
        let first = GetExampleTool.execute(json!({"name": "company.yml"}), &ctx).await.unwrap();
        let second = GetExampleTool.execute(json!({"name": "company.yml"}), &ctx).await.unwrap();

        assert_eq!(first.structured, second.structured);
        assert_eq!(first.structured["uri"], "snowfakery://examples/company.yml");
        let text = first.structured["text"].as_str().unwrap();
        assert_eq!(first.structured["sha256"], crate::catalog::sha256_hex(text.as_bytes()));
    }

    #[tokio::test]
    async fn test_get_example_errors() {
        let (_dir, ctx) = context();
        let err = GetExampleTool.execute(json!({"name": "missing.yml"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = GetExampleTool.execute(json!({"name": "../etc/passwd"}), &ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathContainment);

        let err = GetExampleTool.execute(json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }
}

//! get_schema and search_docs tools

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolResult, parse_args};
use crate::error::ToolError;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;

pub struct GetSchemaTool;

#[async_trait]
impl Tool for GetSchemaTool {
    fn name(&self) -> &'static str {
        "get_schema"
    }

    fn description(&self) -> &'static str {
        "Return the Snowfakery recipe JSON Schema with its resource URI and SHA-256 digest."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let schema = ctx.catalog.schema();
        Ok(ToolResult::success(json!({
            "uri": schema.uri,
            "schema": schema.text,
            "sha256": schema.sha256,
        })))
    }
}

pub struct SearchDocsTool;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl Tool for SearchDocsTool {
    fn name(&self) -> &'static str {
        "search_docs"
    }

    fn description(&self) -> &'static str {
        "Case-insensitive substring search over the Snowfakery documentation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to look for" },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "default": DEFAULT_LIMIT,
                    "description": "Maximum number of hits"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: SearchArgs = parse_args(input)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::validation("query must not be empty"));
        }
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ToolError::validation(format!("limit must be between 1 and {}", MAX_LIMIT)));
        }

        let (hits, truncated) = ctx.catalog.search_docs(query, limit as usize);
        Ok(ToolResult::success(json!({
            "query": query,
            "hits": hits,
            "truncated": truncated,
        })))
    }
}

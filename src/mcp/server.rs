//! MCP server over a byte stream (stdio in production)
//!
//! Requests are read one line at a time and each is handled on its own task,
//! so a long run does not hold up a `ping`. Every response goes through a
//! single writer task.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::{Frame, NdJsonCodec};
use super::messages::{JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse, RpcError};
use crate::error::{ErrorKind, Result, SnowfakeryMcpError};
use crate::prompts;
use crate::resources;
use crate::tools::{ToolContext, ToolExecutor};

/// Protocol revisions this server speaks, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

const RESPONSE_CHANNEL_CAPACITY: usize = 64;

const INSTRUCTIONS: &str = "Snowfakery recipe tools. Read snowfakery://schema/recipe-jsonschema and an example \
before writing a recipe, check it with validate_recipe, then run it with run_recipe using a small reps or \
target_number. Run outputs are readable at snowfakery://runs/{run_id}/{artifact}.";

pub struct McpServer {
    ctx: ToolContext,
    tools: ToolExecutor,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct PromptParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

impl McpServer {
    pub fn new(ctx: ToolContext, tools: ToolExecutor) -> Self {
        Self { ctx, tools }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Serve until `reader` reaches EOF, then wait for in-flight requests.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut frames = FramedRead::new(reader, NdJsonCodec::<Value>::new());
        let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(RESPONSE_CHANNEL_CAPACITY);

        let writer_task = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, NdJsonCodec::<JsonRpcResponse>::new());
            while let Some(response) = rx.recv().await {
                if let Err(e) = sink.send(response).await {
                    log::error!("Failed to write response: {}", e);
                    return Err(e);
                }
            }
            Ok(())
        });

        let mut tasks = JoinSet::new();
        log::info!("MCP server reading requests");

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("Input stream failed: {}", e);
                    break;
                }
            };

            match parse_frame(frame) {
                Err(response) => {
                    if tx.send(*response).await.is_err() {
                        break;
                    }
                }
                Ok(request) => {
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        if let Some(response) = server.handle(request).await {
                            let _ = tx.send(response).await;
                        }
                    });
                }
            }

            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    log::error!("Request task failed: {}", e);
                }
            }
        }

        log::info!("Input closed; waiting for {} in-flight request(s)", tasks.len());
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                log::error!("Request task failed: {}", e);
            }
        }
        drop(tx);

        writer_task
            .await
            .map_err(|e| SnowfakeryMcpError::Protocol(format!("Writer task failed: {}", e)))??;
        Ok(())
    }

    /// Handle one request. Notifications produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            log::debug!("Notification {}", request.method);
            return None;
        };
        log::debug!("Request {} {}", id, request.method);

        let outcome = self.dispatch(&request.method, request.params).await;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                log::info!("{} failed: {} {}", request.method, error.code, error.message);
                JsonRpcResponse::error(id, error)
            }
        })
    }

    async fn dispatch(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.definitions() })),
            "tools/call" => {
                let params: CallParams = parse_params(params)?;
                self.tools
                    .call(&params.name, params.arguments, &self.ctx)
                    .await
                    .map(|result| result.to_call_result())
                    .ok_or_else(|| RpcError::invalid_params(format!("Unknown tool: {}", params.name)))
            }
            "resources/list" => Ok(resources::list(&self.ctx)),
            "resources/templates/list" => Ok(resources::list_templates()),
            "resources/read" => {
                let params: ReadParams = parse_params(params)?;
                match resources::read(&self.ctx, &params.uri).await {
                    Ok(contents) => Ok(json!({ "contents": [contents] })),
                    Err(err) if err.kind == ErrorKind::NotFound => {
                        let err = self.ctx.present_error(err);
                        let data = serde_json::to_value(&err).unwrap_or(Value::Null);
                        Err(RpcError::resource_not_found(&params.uri).with_data(data))
                    }
                    Err(err) => Err(self.ctx.present_error(err).into()),
                }
            }
            "prompts/list" => Ok(json!({ "prompts": prompts::definitions() })),
            "prompts/get" => {
                let params: PromptParams = parse_params(params)?;
                prompts::get(&self.ctx, &params.name, &params.arguments)
                    .map_err(|e| RpcError::invalid_params(e.message))
            }
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
        if let Some(client) = params.get("clientInfo") {
            log::info!("Client connected: {} (protocol {})", client, version);
        }

        json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
                "prompts": { "listChanged": false },
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": INSTRUCTIONS,
        })
    }
}

/// Turn a decoded line into a request, or the error response for it.
fn parse_frame(frame: Frame<Value>) -> std::result::Result<JsonRpcRequest, Box<JsonRpcResponse>> {
    let value = match frame {
        Frame::Malformed(reason) => {
            log::warn!("Unparseable input: {}", reason);
            return Err(Box::new(JsonRpcResponse::error(Value::Null, RpcError::parse_error(reason))));
        }
        Frame::Message(value) => value,
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if value.is_array() {
        return Err(Box::new(JsonRpcResponse::error(
            Value::Null,
            RpcError::invalid_request("Batch requests are not supported"),
        )));
    }
    let request: JsonRpcRequest = serde_json::from_value(value)
        .map_err(|e| Box::new(JsonRpcResponse::error(id.clone(), RpcError::invalid_request(e.to_string()))))?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(Box::new(JsonRpcResponse::error(
            id,
            RpcError::invalid_request(format!("Unsupported jsonrpc version: {}", request.jsonrpc)),
        )));
    }
    Ok(request)
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> std::result::Result<T, RpcError> {
    let params = if params.is_null() { Value::Object(Map::new()) } else { params };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::messages::ErrorCode;
    use crate::tools::context::testing::context;

    fn server() -> (tempfile::TempDir, McpServer) {
        let (dir, ctx) = context();
        (dir, McpServer::new(ctx, ToolExecutor::standard()))
    }

    async fn call(server: &McpServer, method: &str, params: Value) -> JsonRpcResponse {
        server.handle(JsonRpcRequest::new(1, method, params)).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let (_dir, server) = server();
        let resp = call(&server, "initialize", json!({"protocolVersion": "2024-11-05"})).await;
        assert_eq!(resp.result.as_ref().unwrap()["protocolVersion"], "2024-11-05");

        let resp = call(&server, "initialize", json!({"protocolVersion": "1999-01-01"})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
        assert_eq!(result["serverInfo"]["name"], "snowfakery-mcp");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let (_dir, server) = server();
        let note = JsonRpcRequest::notification("notifications/initialized");
        assert!(server.handle(note).await.is_none());
    }

    #[tokio::test]
    async fn test_tools_list_and_unknown_tool() {
        let (_dir, server) = server();
        let resp = call(&server, "tools/list", Value::Null).await;
        assert_eq!(resp.result.unwrap()["tools"].as_array().unwrap().len(), 11);

        let resp = call(&server, "tools/call", json!({"name": "nope"})).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tool_error_is_result_not_rpc_error() {
        let (_dir, server) = server();
        let resp = call(
            &server,
            "tools/call",
            json!({"name": "run_recipe", "arguments": {"recipe_path": "../x.yml"}}),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"]["kind"], "path_containment");
    }

    #[tokio::test]
    async fn test_resource_not_found_code() {
        let (_dir, server) = server();
        let resp = call(&server, "resources/read", json!({"uri": "snowfakery://examples/missing.yml"})).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, ErrorCode::RESOURCE_NOT_FOUND);
        assert_eq!(error.data.unwrap()["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_dir, server) = server();
        let resp = call(&server, "sampling/createMessage", json!({})).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prompts() {
        let (_dir, server) = server();
        let resp = call(&server, "prompts/list", Value::Null).await;
        assert_eq!(resp.result.unwrap()["prompts"].as_array().unwrap().len(), 2);

        let resp = call(&server, "prompts/get", json!({"name": "debug_recipe", "arguments": {"error": "x"}})).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn test_parse_frame_errors() {
        let resp = parse_frame(Frame::Malformed("bad".into())).unwrap_err();
        assert_eq!(resp.error.as_ref().unwrap().code, ErrorCode::PARSE_ERROR);

        let resp = parse_frame(Frame::Message(json!({"jsonrpc": "2.0", "id": 4}))).unwrap_err();
        assert_eq!(resp.id, json!(4));
        assert_eq!(resp.error.as_ref().unwrap().code, ErrorCode::INVALID_REQUEST);

        let resp = parse_frame(Frame::Message(json!([1, 2]))).unwrap_err();
        assert_eq!(resp.error.as_ref().unwrap().code, ErrorCode::INVALID_REQUEST);

        let resp = parse_frame(Frame::Message(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}))).unwrap_err();
        assert_eq!(resp.error.as_ref().unwrap().code, ErrorCode::INVALID_REQUEST);
    }
}

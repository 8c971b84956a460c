//! Model Context Protocol transport: newline-delimited JSON-RPC 2.0.

pub mod codec;
pub mod messages;
pub mod server;

pub use codec::{Frame, NdJsonCodec};
pub use messages::{ErrorCode, JsonRpcRequest, JsonRpcResponse, RpcError};
pub use server::{McpServer, SUPPORTED_PROTOCOL_VERSIONS};

//! snowfakery-mcp - a Model Context Protocol server for Snowfakery
//!
//! Exposes recipe authoring aids (schema, docs, examples), static analysis,
//! and bounded recipe execution to MCP clients over stdio. Every caller path
//! is confined to a workspace root and every run lands in a registered run
//! directory readable through `snowfakery://runs/...` resources.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod id;
pub mod mcp;
pub mod prompts;
pub mod recipe;
pub mod resources;
pub mod runs;
pub mod sandbox;
pub mod tools;

pub use error::{Result, SnowfakeryMcpError, ToolError};

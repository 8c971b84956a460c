//! Error types for snowfakery-mcp
//!
//! Two layers: `ToolError` is the structured, caller-facing payload returned at
//! the tool boundary (closed `ErrorKind` taxonomy plus source location), and
//! `SnowfakeryMcpError` covers internal plumbing.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed taxonomy of failures reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Recipe is not well-formed YAML
    SyntaxError,
    /// Recipe or tool input is well-formed but semantically invalid
    ValidationError,
    /// The upstream engine failed while generating
    RuntimeError,
    /// Timeout, or a repetition/target-count ceiling was exceeded
    ResourceLimitExceeded,
    /// A caller-supplied path escapes the workspace root
    PathContainment,
    /// Network or database access is disabled by server configuration
    ConfigurationGate,
    /// A resource, example or run artifact does not exist
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::ResourceLimitExceeded => "resource_limit_exceeded",
            ErrorKind::PathContainment => "path_containment",
            ErrorKind::ConfigurationGate => "configuration_gate",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error payload returned by tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub line: Option<usize>,
    #[serde(default)]
    pub column: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            filename: None,
            line: None,
            column: None,
            traceback: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    pub fn limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceLimitExceeded, message)
    }

    pub fn containment(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathContainment, message)
    }

    pub fn gate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationGate, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Attach a source location.
    pub fn at(mut self, filename: impl Into<String>, line: Option<usize>, column: Option<usize>) -> Self {
        self.filename = Some(filename.into());
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

/// Internal errors that occur outside the tool boundary
#[derive(Debug, Error)]
pub enum SnowfakeryMcpError {
    /// Bundled or vendored static content is unusable
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Run registry invariant violated
    #[error("Registry error: {0}")]
    Registry(String),

    /// Configuration value could not be applied
    #[error("Config error: {0}")]
    Config(String),

    /// Transport-level failure
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Caller-facing failure surfaced through an internal path
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for internal operations
pub type Result<T> = std::result::Result<T, SnowfakeryMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ResourceLimitExceeded).unwrap();
        assert_eq!(json, "\"resource_limit_exceeded\"");
        let back: ErrorKind = serde_json::from_str("\"path_containment\"").unwrap();
        assert_eq!(back, ErrorKind::PathContainment);
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::validation("reps must be >= 1");
        assert_eq!(err.to_string(), "validation_error: reps must be >= 1");
    }

    #[test]
    fn test_tool_error_location() {
        let err = ToolError::syntax("bad indent").at("recipe.yml", Some(4), Some(2));
        assert_eq!(err.filename.as_deref(), Some("recipe.yml"));
        assert_eq!(err.line, Some(4));
        assert_eq!(err.column, Some(2));
    }

    #[test]
    fn test_tool_error_payload_shape() {
        let err = ToolError::gate("network access is disabled");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "configuration_gate");
        assert!(value["filename"].is_null());
        assert!(value.get("traceback").is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SnowfakeryMcpError = io_err.into();
        assert!(matches!(err, SnowfakeryMcpError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_tool_error_conversion_is_transparent() {
        let err: SnowfakeryMcpError = ToolError::not_found("no such run").into();
        assert_eq!(err.to_string(), "not_found: no such run");
    }
}

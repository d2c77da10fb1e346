//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for configuration and output errors, [`McpError`]
//! for tool channel failures, [`SequenceError`] for failures that abort a
//! sequence mid-way, and [`IterationError`] for a failed driver iteration.

use crate::loadtest::path::PathError;

/// Errors that occur during load test configuration parsing, validation, or file I/O.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero iterations, inverted number range).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The JSON report could not be serialized or written.
    #[error("Failed to write report '{path}': {message}")]
    Report { path: String, message: String },

    /// The target server could not be reached or its tools could not be listed.
    #[error("Failed to connect to server: {source}")]
    Connect {
        #[source]
        source: McpError,
    },
}

/// Tool channel errors encountered while talking to the remote server.
///
/// Transport failures and tool-reported failures are both represented here so
/// the metrics pipeline records them identically.
#[derive(Debug, thiserror::Error, Clone)]
pub enum McpError {
    /// JSON-RPC protocol error returned by the MCP server in the response body.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i32, message: String },

    /// HTTP transport error (4xx or 5xx status code).
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request exceeded a transport-level timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The server answered with something that is not a valid MCP response.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The call succeeded at the transport level but the tool flagged its
    /// result with `isError: true`. Displays as the tool's own message so
    /// identical failures collapse into one error tally entry.
    #[error("{message}")]
    Tool { message: String },
}

impl McpError {
    /// Returns `true` if this is a JSON-RPC "Method not found" error (code -32601).
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, Self::JsonRpc { code: -32601, .. })
    }

    /// Returns `true` if the tool itself reported the failure.
    pub fn is_tool_error(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }

    /// Returns the error category as a static string for log classification.
    ///
    /// Categories: `"jsonrpc"`, `"http"`, `"timeout"`, `"connection"`,
    /// `"protocol"`, `"tool"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::JsonRpc { .. } => "jsonrpc",
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Protocol { .. } => "protocol",
            Self::Tool { .. } => "tool",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`McpError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

/// Failures that abort the remainder of a sequence.
///
/// An unknown tool name is not one of these: it is recorded as a failed call
/// and the engine moves on to the next step.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// A mapping failed to parse, resolve, or write. Covers malformed mapping
    /// values, which are rejected before any tool invocation.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The tool channel failed, or the tool reported an error.
    #[error("Tool '{tool}' failed: {source}")]
    Call {
        tool: String,
        #[source]
        source: McpError,
    },

    /// The tool output was declared as JSON but did not parse.
    #[error("Tool '{tool}' returned output that is not valid JSON: {source}")]
    OutputDecode {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    /// The tool result carried no text content to decode.
    #[error("Tool '{tool}' returned no text content")]
    MissingOutput { tool: String },
}

/// A failed driver iteration. Logged and swallowed by the run loop.
#[derive(Debug, thiserror::Error)]
pub enum IterationError {
    /// The server advertised no tools to pick from.
    #[error("No tools available on the server")]
    NoTools,

    /// A random-mode call failed.
    #[error("Tool '{tool}' failed: {source}")]
    Call {
        tool: String,
        #[source]
        source: McpError,
    },

    /// The configured sequence aborted.
    #[error("Sequence aborted: {0}")]
    Sequence(#[from] SequenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_method_not_found() {
        let err = McpError::JsonRpc {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert!(err.is_method_not_found());

        let other = McpError::JsonRpc {
            code: -32602,
            message: "Invalid params".to_string(),
        };
        assert!(!other.is_method_not_found());
    }

    #[test]
    fn test_tool_error_displays_bare_message() {
        let err = McpError::Tool {
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "boom");
        assert!(err.is_tool_error());
        assert_eq!(err.error_category(), "tool");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(McpError::Timeout.error_category(), "timeout");
        assert_eq!(
            McpError::Http {
                status: 500,
                body: "Internal Server Error".to_string(),
            }
            .error_category(),
            "http"
        );
        assert_eq!(
            McpError::Connection {
                message: "DNS resolution failed".to_string(),
            }
            .error_category(),
            "connection"
        );
        assert_eq!(
            McpError::Protocol {
                message: "missing result".to_string(),
            }
            .error_category(),
            "protocol"
        );
    }

    #[test]
    fn test_sequence_call_error_mentions_tool() {
        let err = SequenceError::Call {
            tool: "create_user".to_string(),
            source: McpError::Timeout,
        };
        let msg = err.to_string();
        assert!(msg.contains("create_user"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_iteration_error_wraps_sequence_error() {
        let err: IterationError = SequenceError::MissingOutput {
            tool: "echo".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Sequence aborted: Tool 'echo' returned no text content"
        );
    }

    #[test]
    fn test_config_validation_message() {
        let err = LoadTestError::ConfigValidation {
            message: "num_calls must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("num_calls"));
    }
}

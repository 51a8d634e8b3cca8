//! Error types for RPC calls

use crate::value::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Call {operation} (tag {tag}) timed out after {timeout:?}")]
    Timeout {
        tag: u64,
        operation: String,
        timeout: Duration,
    },

    #[error("Call {operation} failed remotely: {payload}")]
    Remote { operation: String, payload: Value },

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC channel closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "rpc_timeout",
            Self::Remote { .. } => "rpc_remote",
            Self::Signature(_) => "rpc_signature",
            Self::Transport(_) => "rpc_transport",
            Self::Closed => "rpc_closed",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

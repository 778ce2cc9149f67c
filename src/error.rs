//! Error types for the nested-set engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unable to identify root of node tree, multiple supplied: {}", .0.join(", "))]
    AmbiguousRoot(Vec<String>),

    #[error("Unable to determine root of non-root node")]
    UndeterminableRoot,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Operation not allowed in read-only mode")]
    ReadOnlyMode,
}

impl TreeError {
    /// Stable error code for callers that map errors onto their own protocol
    pub fn code(&self) -> &'static str {
        match self {
            TreeError::NodeNotFound(_) => "NODE_NOT_FOUND",
            TreeError::InvalidArgument(_) => "INVALID_ARGUMENT",
            TreeError::AmbiguousRoot(_) => "AMBIGUOUS_ROOT",
            TreeError::UndeterminableRoot => "UNDETERMINABLE_ROOT",
            TreeError::InvalidFormat(_) => "INVALID_FORMAT",
            TreeError::ReadOnlyMode => "READ_ONLY_MODE",
            _ => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn not_found(id: impl std::fmt::Display) -> Self {
        TreeError::NodeNotFound(id.to_string())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TreeError::InvalidArgument(msg.into())
    }
}

//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. No over-engineering.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(u32),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Document has no elements")]
    EmptyDocument,
}

impl DomError {
    pub(crate) fn serialization(msg: impl Into<String>) -> Self {
        DomError::SerializationError(msg.into())
    }
}

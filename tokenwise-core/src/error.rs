//! Error types for TokenWise

use thiserror::Error;

/// Crate-wide error type shared by the client and service layers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenwiseError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TokenwiseError {
    pub fn api(msg: impl Into<String>) -> Self {
        TokenwiseError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        TokenwiseError::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        TokenwiseError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        TokenwiseError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        TokenwiseError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        TokenwiseError::Internal(msg.into())
    }

    /// Whether the request never reached a usable response (retrying may help)
    pub fn is_transport(&self) -> bool {
        matches!(self, TokenwiseError::Network(_))
    }
}

/// Result type alias for TokenWise operations
pub type TokenwiseResult<T> = Result<T, TokenwiseError>;

use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid base64 string: {0}")]
    InvalidBase64(String),

    #[error("key id must not be empty")]
    EmptyKeyId,

    #[error("invalid object reference: {0}")]
    InvalidObjectRef(String),
}

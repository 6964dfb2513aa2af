use veil_types::KeyId;

/// Server code reported when a key create or fetch is refused by policy.
pub const DENIED_CODE: u32 = 40024;

/// Errors from key-service sessions and profile loading.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    /// No credential profile has been configured, or the configured profile
    /// store holds no active profile.
    #[error("no active credential profile is configured")]
    NoActiveCredential,

    /// The key service refused the request.
    #[error("key service denied the request (code {code}): {message}")]
    Denied { code: u32, message: String },

    #[error("key not found: {0}")]
    KeyNotFound(KeyId),

    /// The handshake for a profile was rejected.
    #[error("authentication failed for profile {0}")]
    AuthenticationFailed(String),

    #[error("key service transport error: {0}")]
    Transport(String),

    #[error("key service timed out: {0}")]
    Timeout(String),

    #[error("key service request cancelled: {0}")]
    Cancelled(String),

    /// A profile or profile set is malformed.
    #[error("invalid profile: {0}")]
    Profile(String),

    #[error("internal key service error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KmsError {
    /// A policy denial carrying [`DENIED_CODE`].
    pub fn denied(message: impl Into<String>) -> Self {
        Self::Denied {
            code: DENIED_CODE,
            message: message.into(),
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// HTTP-style status for this failure, as seen by a storage caller.
    pub fn status(&self) -> u16 {
        match self {
            Self::KeyNotFound(_) => 404,
            Self::NoActiveCredential | Self::Denied { .. } | Self::AuthenticationFailed(_) => 403,
            Self::Timeout(_) => 504,
            Self::Cancelled(_) => 499,
            Self::Transport(_) => 502,
            Self::Profile(_) | Self::Internal(_) | Self::Io(_) | Self::Serialization(_) => 500,
        }
    }
}

/// Result alias for key-service operations.
pub type KmsResult<T> = Result<T, KmsError>;

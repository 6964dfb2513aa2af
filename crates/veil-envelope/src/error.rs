use tracing::warn;
use veil_kms::KmsError;
use veil_store::StoreError;

/// Errors from configuring an encrypted storage facade.
///
/// Storage operations themselves report [`StoreError`]; a key-service
/// failure during one of them arrives as [`StoreError::KeyService`] and can
/// be recovered with [`key_service_error`].
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("configuration could not be encoded: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Internal failure (poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for facade configuration.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// The key-service error behind a failed storage operation, if that is
/// what made it fail.
pub fn key_service_error(err: &StoreError) -> Option<&KmsError> {
    match err {
        StoreError::KeyService { source, .. } => source.downcast_ref::<KmsError>(),
        _ => None,
    }
}

/// Surface a key-service failure as a failure of the enclosing storage
/// operation, keeping the status it maps to.
pub(crate) fn key_service_failure(err: KmsError) -> StoreError {
    if err.is_denied() {
        warn!(error = %err, "key service refused request");
    }
    StoreError::KeyService {
        status: err.status(),
        source: Box::new(err),
    }
}

use veil_types::ObjectRef;

/// Errors from object-storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectRef),

    /// The requested bucket was not found.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The requested HMAC key was not found.
    #[error("hmac key not found: {0}")]
    HmacKeyNotFound(String),

    /// A bucket or object with this name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The bucket still holds objects and cannot be deleted.
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// A generation/metageneration precondition did not hold.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The object is sealed with a customer-supplied key and none was given.
    #[error("object {0} is encrypted with a customer-supplied key; a decryption key is required")]
    EncryptionKeyRequired(ObjectRef),

    /// The supplied key does not match the key the object was sealed with.
    #[error("supplied encryption key does not match the key of object {0}")]
    EncryptionKeyMismatch(ObjectRef),

    /// The supplied key option is malformed, or was given for an object that
    /// is not sealed with a customer-supplied key.
    #[error("invalid encryption key: {0}")]
    InvalidEncryptionKey(String),

    /// The operation is not supported by this storage implementation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The key service refused or failed a request made on behalf of this
    /// storage operation. `status` is the HTTP-style code the key-service
    /// error maps to; the source is the key-service error itself.
    #[error("key service failure: {source}")]
    KeyService {
        status: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A request argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation timed out in a downstream dependency.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled by a downstream dependency.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Internal storage failure (poisoned lock, sealing failure, ...).
    #[error("internal storage error: {0}")]
    Internal(String),

    /// I/O error while streaming payload bytes.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// HTTP-style status code, mirroring what a remote object store reports.
    pub fn code(&self) -> u16 {
        match self {
            Self::ObjectNotFound(_) | Self::BucketNotFound(_) | Self::HmacKeyNotFound(_) => 404,
            Self::AlreadyExists(_) | Self::BucketNotEmpty(_) => 409,
            Self::PreconditionFailed(_) => 412,
            Self::EncryptionKeyRequired(_)
            | Self::EncryptionKeyMismatch(_)
            | Self::InvalidEncryptionKey(_)
            | Self::InvalidArgument(_) => 400,
            Self::Unsupported(_) => 501,
            Self::KeyService { status, .. } => *status,
            Self::Timeout(_) => 504,
            Self::Cancelled(_) => 499,
            Self::Internal(_) | Self::Io(_) => 500,
        }
    }

    /// Returns `true` for the not-found family of errors.
    pub fn is_not_found(&self) -> bool {
        self.code() == 404
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_http_conventions() {
        assert_eq!(StoreError::ObjectNotFound(ObjectRef::new("b", "o")).code(), 404);
        assert!(StoreError::BucketNotFound("b".into()).is_not_found());
        assert_eq!(StoreError::PreconditionFailed("gen".into()).code(), 412);
        assert_eq!(StoreError::Unsupported("x".into()).code(), 501);
    }

    #[test]
    fn key_service_keeps_source() {
        use std::error::Error as _;
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StoreError::KeyService {
            status: 403,
            source: Box::new(inner),
        };
        assert!(err.source().is_some());
        assert_eq!(err.code(), 403);
        assert!(!err.is_not_found());
    }

    #[test]
    fn key_service_status_drives_code() {
        let missing = StoreError::KeyService {
            status: 404,
            source: "no such key".into(),
        };
        assert!(missing.is_not_found());
        let slow = StoreError::KeyService {
            status: 504,
            source: "deadline".into(),
        };
        assert_eq!(slow.code(), 504);
    }
}

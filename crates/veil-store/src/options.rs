//! Per-call options accepted by [`crate::ObjectStorage`] operations.
//!
//! Each operation family takes a slice of its own option enum. The
//! customer-supplied key options carry the key base64-encoded, the way
//! remote object stores expect it on the wire.

use std::fmt;

use veil_types::{KeySecret, TypeError};

use crate::model::ObjectField;

/// A base64-encoded customer-supplied key. Redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedKey(String);

impl EncodedKey {
    pub fn from_secret(secret: &KeySecret) -> Self {
        Self(secret.to_base64())
    }

    /// Wrap an already-encoded key without validating it.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<KeySecret, TypeError> {
        KeySecret::from_base64(&self.0)
    }
}

impl fmt::Debug for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncodedKey(<redacted>)")
    }
}

/// A precondition an option imposes on the current state of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    DoesNotExist,
    GenerationMatch(i64),
    GenerationNotMatch(i64),
    MetagenerationMatch(i64),
}

/// Behaviour shared by every per-call option family.
pub trait CallOption: Clone + fmt::Debug + Send + Sync {
    /// The customer-supplied key this option carries, if any.
    fn customer_key(&self) -> Option<&EncodedKey> {
        None
    }

    fn precondition(&self) -> Option<Precondition> {
        None
    }
}

/// First customer-supplied key found in `options`.
pub fn find_customer_key<O: CallOption>(options: &[O]) -> Option<&EncodedKey> {
    options.iter().find_map(CallOption::customer_key)
}

/// All preconditions carried by `options`, in order.
pub fn preconditions<O: CallOption>(options: &[O]) -> Vec<Precondition> {
    options.iter().filter_map(CallOption::precondition).collect()
}

/// Options for creating or updating an object from an in-memory payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetOption {
    EncryptionKey(EncodedKey),
    DoesNotExist,
    GenerationMatch(i64),
    GenerationNotMatch(i64),
    MetagenerationMatch(i64),
    UserProject(String),
}

impl TargetOption {
    pub fn encryption_key(secret: &KeySecret) -> Self {
        Self::EncryptionKey(EncodedKey::from_secret(secret))
    }
}

impl CallOption for TargetOption {
    fn customer_key(&self) -> Option<&EncodedKey> {
        match self {
            Self::EncryptionKey(key) => Some(key),
            _ => None,
        }
    }

    fn precondition(&self) -> Option<Precondition> {
        match self {
            Self::DoesNotExist => Some(Precondition::DoesNotExist),
            Self::GenerationMatch(g) => Some(Precondition::GenerationMatch(*g)),
            Self::GenerationNotMatch(g) => Some(Precondition::GenerationNotMatch(*g)),
            Self::MetagenerationMatch(m) => Some(Precondition::MetagenerationMatch(*m)),
            _ => None,
        }
    }
}

/// Options for streamed writes (reader uploads and write channels).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOption {
    EncryptionKey(EncodedKey),
    DoesNotExist,
    GenerationMatch(i64),
    MetagenerationMatch(i64),
    /// Verify the upload against this hex SHA-256 of the payload.
    ChecksumMatch(String),
    UserProject(String),
}

impl WriteOption {
    pub fn encryption_key(secret: &KeySecret) -> Self {
        Self::EncryptionKey(EncodedKey::from_secret(secret))
    }
}

impl CallOption for WriteOption {
    fn customer_key(&self) -> Option<&EncodedKey> {
        match self {
            Self::EncryptionKey(key) => Some(key),
            _ => None,
        }
    }

    fn precondition(&self) -> Option<Precondition> {
        match self {
            Self::DoesNotExist => Some(Precondition::DoesNotExist),
            Self::GenerationMatch(g) => Some(Precondition::GenerationMatch(*g)),
            Self::MetagenerationMatch(m) => Some(Precondition::MetagenerationMatch(*m)),
            _ => None,
        }
    }
}

/// Options for reading or deleting an existing object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceOption {
    DecryptionKey(EncodedKey),
    GenerationMatch(i64),
    MetagenerationMatch(i64),
    UserProject(String),
}

impl SourceOption {
    pub fn decryption_key(secret: &KeySecret) -> Self {
        Self::DecryptionKey(EncodedKey::from_secret(secret))
    }
}

impl CallOption for SourceOption {
    fn customer_key(&self) -> Option<&EncodedKey> {
        match self {
            Self::DecryptionKey(key) => Some(key),
            _ => None,
        }
    }

    fn precondition(&self) -> Option<Precondition> {
        match self {
            Self::GenerationMatch(g) => Some(Precondition::GenerationMatch(*g)),
            Self::MetagenerationMatch(m) => Some(Precondition::MetagenerationMatch(*m)),
            _ => None,
        }
    }
}

/// Options for metadata-only object lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GetOption {
    /// Restrict the optional fields returned.
    Fields(Vec<ObjectField>),
    GenerationMatch(i64),
    MetagenerationMatch(i64),
    UserProject(String),
}

impl CallOption for GetOption {
    fn precondition(&self) -> Option<Precondition> {
        match self {
            Self::GenerationMatch(g) => Some(Precondition::GenerationMatch(*g)),
            Self::MetagenerationMatch(m) => Some(Precondition::MetagenerationMatch(*m)),
            _ => None,
        }
    }
}

/// Options for bucket operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BucketOption {
    MetagenerationMatch(i64),
    UserProject(String),
}

impl CallOption for BucketOption {
    fn precondition(&self) -> Option<Precondition> {
        match self {
            Self::MetagenerationMatch(m) => Some(Precondition::MetagenerationMatch(*m)),
            Self::UserProject(_) => None,
        }
    }
}

/// Options for listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListOption {
    Prefix(String),
    PageSize(usize),
    PageToken(String),
    UserProject(String),
}

impl CallOption for ListOption {}

/// Options for URL signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignUrlOption {
    HttpMethod(String),
    ContentType(String),
}

impl CallOption for SignUrlOption {}

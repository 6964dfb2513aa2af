//! The key-service boundary: sessions, connectors and providers.
//!
//! A [`Connector`] performs the authentication handshake and yields a
//! [`KeySession`]. A [`KeySessionProvider`] hides that handshake from the
//! hot path by handing out ready sessions; the two strategies are
//! [`crate::PooledSessionProvider`] and [`crate::TemplateSessionProvider`].

use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Serialize};
use veil_types::{KeyAttributes, KeyId, KeySecret};

use crate::error::{KmsError, KmsResult};
use crate::profile::{Profile, ProfileStore};

/// Application identity fields sent with every key-service request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMetadata(BTreeMap<String, String>);

impl ClientMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

/// Parameters for minting one content key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRequest {
    /// Caller reference echoed to the key service with the request.
    pub ref_id: Option<String>,
    pub attributes: KeyAttributes,
    /// Attributes the key service allows to change after creation.
    pub mutable_attributes: KeyAttributes,
}

impl KeyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    pub fn with_attributes(mut self, attributes: KeyAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_mutable_attributes(mut self, attributes: KeyAttributes) -> Self {
        self.mutable_attributes = attributes;
        self
    }
}

/// A content key as returned by the key service. Never persisted; the
/// secret is zeroized when the key is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentKey {
    pub id: KeyId,
    pub secret: KeySecret,
    pub attributes: KeyAttributes,
    pub mutable_attributes: KeyAttributes,
}

/// An authenticated handle to the key service, bound to one profile.
pub trait KeySession: Send {
    /// Create a new content key. Performs network I/O.
    fn mint(&mut self, request: &KeyRequest) -> KmsResult<ContentKey>;

    /// Fetch an existing content key. Performs network I/O.
    fn resolve(&mut self, id: &KeyId) -> KmsResult<ContentKey>;

    /// Replace the client metadata sent with subsequent requests.
    fn set_client_metadata(&mut self, metadata: &ClientMetadata);

    /// Id of the profile this session authenticated with.
    fn profile_id(&self) -> &str;
}

/// Performs the authentication handshake for a profile.
pub trait Connector: Send + Sync {
    type Session: KeySession + 'static;

    /// Authenticate `profile` and return a session. Performs network I/O.
    fn connect(&self, profile: &Profile, metadata: &ClientMetadata) -> KmsResult<Self::Session>;
}

/// Supplies ready, authenticated sessions to concurrent callers.
///
/// A session returned by [`KeySessionProvider::acquire`] is owned by the
/// caller until dropped; no two callers ever hold the same session.
pub trait KeySessionProvider: Send + Sync {
    /// A session for one operation. Fails with
    /// [`KmsError::NoActiveCredential`] if no profile has been set.
    fn acquire(&self) -> KmsResult<Box<dyn KeySession + '_>>;

    /// Switch to `profile`. Sessions bound to the previous profile are never
    /// handed out again.
    fn set_profile(&self, profile: Profile) -> KmsResult<()>;

    /// Load the active profile from `store` and switch to it.
    fn set_profile_store(&self, store: &dyn ProfileStore) -> KmsResult<()> {
        let profile = store.load_active()?.ok_or(KmsError::NoActiveCredential)?;
        self.set_profile(profile)
    }

    /// A copy of the client metadata applied to sessions.
    fn client_metadata(&self) -> KmsResult<ClientMetadata>;

    fn set_client_metadata(&self, metadata: ClientMetadata) -> KmsResult<()>;

    fn mint(&self, request: &KeyRequest) -> KmsResult<ContentKey> {
        let mut session = self.acquire()?;
        session.mint(request)
    }

    fn resolve(&self, id: &KeyId) -> KmsResult<ContentKey> {
        let mut session = self.acquire()?;
        session.resolve(id)
    }
}

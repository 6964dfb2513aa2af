//! In-memory key service for tests and embedding.
//!
//! [`InMemoryKeyService`] mints content keys, keeps their attributes, and
//! enforces two policies: a profile must be enrolled (with a matching
//! credential) before it can authenticate, and any request touching a key
//! whose attributes match a deny rule is refused with [`KmsError::Denied`].
//! It also counts handshakes so tests can verify that providers keep them
//! off the hot path, and it tags every session value with a handle so tests
//! can check that no handle ever serves two requests at once.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};
use uuid::Uuid;
use veil_types::{KeyAttributes, KeyId, KeySecret};

use crate::error::{KmsError, KmsResult};
use crate::profile::Profile;
use crate::session::{ClientMetadata, Connector, ContentKey, KeyRequest, KeySession};

struct KeyRecord {
    secret: KeySecret,
    attributes: KeyAttributes,
    mutable_attributes: KeyAttributes,
    ref_id: Option<String>,
}

impl KeyRecord {
    fn to_content_key(&self, id: KeyId) -> ContentKey {
        ContentKey {
            id,
            secret: self.secret.clone(),
            attributes: self.attributes.clone(),
            mutable_attributes: self.mutable_attributes.clone(),
        }
    }
}

#[derive(Default)]
struct ServiceState {
    keys: HashMap<KeyId, KeyRecord>,
    /// Profile id -> credential.
    enrolled: BTreeMap<String, String>,
    /// Attribute name -> denied values.
    deny: BTreeMap<String, BTreeSet<String>>,
    unavailable: bool,
    handshakes: usize,
    requests: usize,
    /// Session handles with a request in progress.
    live: HashSet<u64>,
    overlaps: usize,
    last_metadata: Option<ClientMetadata>,
}

impl ServiceState {
    fn denied_by(&self, attributes: &KeyAttributes) -> Option<(String, String)> {
        attributes.iter().find_map(|(name, values)| {
            let denied = self.deny.get(name)?;
            values
                .iter()
                .find(|v| denied.contains(*v))
                .map(|v| (name.clone(), v.clone()))
        })
    }
}

/// A shared, in-memory key service. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryKeyService {
    state: Arc<Mutex<ServiceState>>,
    next_handle: Arc<AtomicU64>,
}

impl InMemoryKeyService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> KmsResult<MutexGuard<'_, ServiceState>> {
        self.state
            .lock()
            .map_err(|e| KmsError::Internal(format!("key service lock poisoned: {e}")))
    }

    /// Allow `profile` to authenticate with its current credential.
    pub fn enroll(&self, profile: &Profile) -> KmsResult<()> {
        profile.validate()?;
        self.lock()?
            .enrolled
            .insert(profile.id.clone(), profile.credential.clone());
        Ok(())
    }

    /// Refuse creation and retrieval of keys carrying `name = value`.
    pub fn deny_attribute(&self, name: impl Into<String>, value: impl Into<String>) -> KmsResult<()> {
        self.lock()?
            .deny
            .entry(name.into())
            .or_default()
            .insert(value.into());
        Ok(())
    }

    /// While unavailable, every key request fails with [`KmsError::Timeout`].
    pub fn set_unavailable(&self, unavailable: bool) -> KmsResult<()> {
        self.lock()?.unavailable = unavailable;
        Ok(())
    }

    pub fn connector(&self) -> InMemoryConnector {
        InMemoryConnector {
            service: self.clone(),
        }
    }

    pub fn handshake_count(&self) -> KmsResult<usize> {
        Ok(self.lock()?.handshakes)
    }

    /// Number of mint and resolve requests received.
    pub fn request_count(&self) -> KmsResult<usize> {
        Ok(self.lock()?.requests)
    }

    pub fn key_count(&self) -> KmsResult<usize> {
        Ok(self.lock()?.keys.len())
    }

    /// The caller reference a key was minted with.
    pub fn key_ref(&self, id: &KeyId) -> KmsResult<Option<String>> {
        Ok(self.lock()?.keys.get(id).and_then(|k| k.ref_id.clone()))
    }

    /// Client metadata sent with the most recent request.
    pub fn last_client_metadata(&self) -> KmsResult<Option<ClientMetadata>> {
        Ok(self.lock()?.last_metadata.clone())
    }

    /// How many requests started on a session handle that was already
    /// serving another request.
    pub fn overlapping_uses(&self) -> KmsResult<usize> {
        Ok(self.lock()?.overlaps)
    }

    /// Number of distinct session values handed out so far.
    pub fn session_count(&self) -> u64 {
        self.next_handle.load(Ordering::SeqCst)
    }

    fn allocate_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// Mark `handle` live until the returned guard drops.
    fn enter(&self, handle: u64) -> KmsResult<InFlight<'_>> {
        let mut state = self.lock()?;
        if !state.live.insert(handle) {
            warn!(session = handle, "session handle used by two requests at once");
            state.overlaps += 1;
            return Ok(InFlight {
                service: self,
                handle,
                owned: false,
            });
        }
        Ok(InFlight {
            service: self,
            handle,
            owned: true,
        })
    }

    fn begin_request(&self, session: &InMemorySession) -> KmsResult<MutexGuard<'_, ServiceState>> {
        let mut state = self.lock()?;
        state.requests += 1;
        state.last_metadata = Some(session.metadata.clone());
        if state.unavailable {
            return Err(KmsError::Timeout(format!(
                "key service unreachable for profile {}",
                session.profile_id
            )));
        }
        Ok(state)
    }
}

/// Authenticates profiles enrolled with an [`InMemoryKeyService`].
#[derive(Clone)]
pub struct InMemoryConnector {
    service: InMemoryKeyService,
}

impl Connector for InMemoryConnector {
    type Session = InMemorySession;

    fn connect(&self, profile: &Profile, metadata: &ClientMetadata) -> KmsResult<InMemorySession> {
        let mut state = self.service.lock()?;
        state.handshakes += 1;
        if state.enrolled.get(&profile.id) != Some(&profile.credential) {
            warn!(profile = %profile.id, "handshake rejected");
            return Err(KmsError::AuthenticationFailed(profile.id.clone()));
        }
        debug!(profile = %profile.id, server = %profile.server, "handshake complete");
        Ok(InMemorySession {
            service: self.service.clone(),
            profile_id: profile.id.clone(),
            key_space: profile.key_space.clone(),
            metadata: metadata.clone(),
            handle: self.service.allocate_handle(),
        })
    }
}

/// A session against an [`InMemoryKeyService`].
///
/// Every session value carries its own handle. A clone is a new working
/// copy and gets a fresh one; moving a session keeps it.
pub struct InMemorySession {
    service: InMemoryKeyService,
    profile_id: String,
    key_space: String,
    metadata: ClientMetadata,
    handle: u64,
}

impl InMemorySession {
    pub fn handle(&self) -> u64 {
        self.handle
    }
}

impl Clone for InMemorySession {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            profile_id: self.profile_id.clone(),
            key_space: self.key_space.clone(),
            metadata: self.metadata.clone(),
            handle: self.service.allocate_handle(),
        }
    }
}

impl fmt::Debug for InMemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySession")
            .field("handle", &self.handle)
            .field("profile_id", &self.profile_id)
            .field("key_space", &self.key_space)
            .finish_non_exhaustive()
    }
}

/// Keeps a session handle marked live for the length of one request.
struct InFlight<'a> {
    service: &'a InMemoryKeyService,
    handle: u64,
    /// False when the handle was already live; the first request clears it.
    owned: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Ok(mut state) = self.service.state.lock() {
            state.live.remove(&self.handle);
        }
    }
}

impl KeySession for InMemorySession {
    fn mint(&mut self, request: &KeyRequest) -> KmsResult<ContentKey> {
        let _guard = self.service.enter(self.handle)?;
        let mut state = self.service.begin_request(self)?;
        if let Some((name, value)) = state.denied_by(&request.attributes) {
            warn!(profile = %self.profile_id, attribute = %name, "key creation denied");
            return Err(KmsError::denied(format!(
                "key creation denied by policy on {name}={value}"
            )));
        }

        let id = KeyId::new(format!("{}{}", self.key_space, Uuid::now_v7().simple()))
            .map_err(|e| KmsError::Internal(e.to_string()))?;
        let record = KeyRecord {
            secret: KeySecret::generate(),
            attributes: request.attributes.clone(),
            mutable_attributes: request.mutable_attributes.clone(),
            ref_id: request.ref_id.clone(),
        };
        let key = record.to_content_key(id.clone());
        state.keys.insert(id, record);
        debug!(key_id = %key.id, attributes = key.attributes.len(), "key minted");
        Ok(key)
    }

    fn resolve(&mut self, id: &KeyId) -> KmsResult<ContentKey> {
        let _guard = self.service.enter(self.handle)?;
        let state = self.service.begin_request(self)?;
        let record = state
            .keys
            .get(id)
            .ok_or_else(|| KmsError::KeyNotFound(id.clone()))?;
        if let Some((name, value)) = state
            .denied_by(&record.attributes)
            .or_else(|| state.denied_by(&record.mutable_attributes))
        {
            warn!(profile = %self.profile_id, key_id = %id, attribute = %name, "key fetch denied");
            return Err(KmsError::denied(format!(
                "key fetch denied by policy on {name}={value}"
            )));
        }
        Ok(record.to_content_key(id.clone()))
    }

    fn set_client_metadata(&mut self, metadata: &ClientMetadata) {
        self.metadata = metadata.clone();
    }

    fn profile_id(&self) -> &str {
        &self.profile_id
    }
}

//! Credential profiles and the stores they are loaded from.
//!
//! A [`Profile`] binds a key-service endpoint to one credential. Providers
//! never read profiles on their own; the owning application loads one from
//! a [`ProfileStore`] and hands it over.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KmsError, KmsResult};

/// One credential profile for the key service. The credential is redacted
/// in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Key-service endpoint.
    pub server: String,
    /// Prefix under which this profile's keys are minted.
    pub key_space: String,
    pub credential: String,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        server: impl Into<String>,
        key_space: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            server: server.into(),
            key_space: key_space.into(),
            credential: credential.into(),
        }
    }

    /// Reject profiles that could never authenticate.
    pub fn validate(&self) -> KmsResult<()> {
        if self.id.is_empty() {
            return Err(KmsError::Profile("profile id is empty".into()));
        }
        if self.server.is_empty() {
            return Err(KmsError::Profile(format!("profile {} has no server", self.id)));
        }
        if self.key_space.is_empty() {
            return Err(KmsError::Profile(format!(
                "profile {} has no key space",
                self.id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("id", &self.id)
            .field("server", &self.server)
            .field("key_space", &self.key_space)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// A source of the active credential profile.
pub trait ProfileStore: Send + Sync {
    /// The active profile, or `Ok(None)` when the store has none.
    fn load_active(&self) -> KmsResult<Option<Profile>>;
}

// ---------------------------------------------------------------------------
// Plaintext JSON file
// ---------------------------------------------------------------------------

/// The on-disk shape of a profile file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl ProfileSet {
    /// The profile named by `active_profile`.
    ///
    /// Naming a profile that is not in the set is an error, not `None`.
    pub fn active(&self) -> KmsResult<Option<&Profile>> {
        let Some(active) = &self.active_profile else {
            return Ok(None);
        };
        self.profiles
            .iter()
            .find(|p| &p.id == active)
            .map(Some)
            .ok_or_else(|| KmsError::Profile(format!("active profile {active} is not in the set")))
    }
}

/// Profiles stored as plaintext JSON. Suitable for development only: the
/// credentials are not protected at rest.
#[derive(Clone, Debug)]
pub struct PlaintextProfileFile {
    path: PathBuf,
}

impl PlaintextProfileFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> KmsResult<ProfileSet> {
        let raw = fs::read_to_string(&self.path)?;
        let set: ProfileSet = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), profiles = set.profiles.len(), "profile set loaded");
        Ok(set)
    }

    pub fn save(&self, set: &ProfileSet) -> KmsResult<()> {
        let raw = serde_json::to_string_pretty(set)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl ProfileStore for PlaintextProfileFile {
    fn load_active(&self) -> KmsResult<Option<Profile>> {
        let set = self.load()?;
        let active = set.active()?.cloned();
        if let Some(profile) = &active {
            profile.validate()?;
        }
        Ok(active)
    }
}

/// A fixed, in-memory profile store.
#[derive(Clone, Debug, Default)]
pub struct StaticProfileStore {
    profile: Option<Profile>,
}

impl StaticProfileStore {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Some(profile),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl ProfileStore for StaticProfileStore {
    fn load_active(&self) -> KmsResult<Option<Profile>> {
        Ok(self.profile.clone())
    }
}

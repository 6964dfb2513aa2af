use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{KmsError, KmsResult};
use crate::profile::Profile;
use crate::session::{ClientMetadata, Connector, KeySession, KeySessionProvider};

/// Authenticates once per profile and hands out clones of that template.
///
/// Deriving a working copy is a plain `Clone` of the template session: no
/// handshake, no shared mutable state. The `RwLock`s only guard replacement
/// of the template and of the client metadata; derivations take read locks
/// and never wait on each other.
pub struct TemplateSessionProvider<C>
where
    C: Connector,
    C::Session: Clone + Sync,
{
    connector: C,
    template: RwLock<Option<Arc<C::Session>>>,
    metadata: RwLock<ClientMetadata>,
}

impl<C> TemplateSessionProvider<C>
where
    C: Connector,
    C::Session: Clone + Sync,
{
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            template: RwLock::new(None),
            metadata: RwLock::new(ClientMetadata::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns `true` once a profile has been authenticated.
    pub fn is_configured(&self) -> KmsResult<bool> {
        Ok(self.current_template()?.is_some())
    }

    fn current_template(&self) -> KmsResult<Option<Arc<C::Session>>> {
        let slot = self
            .template
            .read()
            .map_err(|e| KmsError::Internal(format!("template lock poisoned: {e}")))?;
        Ok(slot.clone())
    }

    fn current_metadata(&self) -> KmsResult<ClientMetadata> {
        let metadata = self
            .metadata
            .read()
            .map_err(|e| KmsError::Internal(format!("client metadata lock poisoned: {e}")))?;
        Ok(metadata.clone())
    }
}

impl<C> KeySessionProvider for TemplateSessionProvider<C>
where
    C: Connector,
    C::Session: Clone + Sync,
{
    fn acquire(&self) -> KmsResult<Box<dyn KeySession + '_>> {
        let template = self.current_template()?.ok_or(KmsError::NoActiveCredential)?;
        let mut copy = C::Session::clone(&template);
        copy.set_client_metadata(&self.current_metadata()?);
        Ok(Box::new(copy))
    }

    /// Authenticates `profile` before swapping it in; on failure the
    /// previous template stays active.
    fn set_profile(&self, profile: Profile) -> KmsResult<()> {
        profile.validate()?;
        let metadata = self.current_metadata()?;
        debug!(profile = %profile.id, "authenticating session template");
        let session = self.connector.connect(&profile, &metadata)?;

        let mut slot = self
            .template
            .write()
            .map_err(|e| KmsError::Internal(format!("template lock poisoned: {e}")))?;
        *slot = Some(Arc::new(session));
        info!(profile = %profile.id, "session template replaced");
        Ok(())
    }

    fn client_metadata(&self) -> KmsResult<ClientMetadata> {
        self.current_metadata()
    }

    fn set_client_metadata(&self, metadata: ClientMetadata) -> KmsResult<()> {
        let mut slot = self
            .metadata
            .write()
            .map_err(|e| KmsError::Internal(format!("client metadata lock poisoned: {e}")))?;
        *slot = metadata;
        Ok(())
    }
}

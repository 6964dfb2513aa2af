use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};
use veil_types::KeyId;

use crate::error::{KmsError, KmsResult};
use crate::profile::Profile;
use crate::session::{ClientMetadata, Connector, ContentKey, KeyRequest, KeySession, KeySessionProvider};

struct PoolState<S> {
    profile: Option<Profile>,
    /// Bumped on every profile change; sessions remember the epoch they
    /// were created in.
    epoch: u64,
    idle: Vec<S>,
    metadata: ClientMetadata,
}

/// A stack of authenticated sessions guarded by one mutex.
///
/// The lock is held only to push or pop; handshakes for new sessions run
/// outside it. A session checked out with [`KeySessionProvider::acquire`]
/// goes back on the stack when the returned guard is dropped, unless the
/// profile changed in the meantime, in which case it is discarded.
pub struct PooledSessionProvider<C: Connector> {
    connector: C,
    max_idle: Option<usize>,
    state: Mutex<PoolState<C::Session>>,
}

impl<C: Connector> PooledSessionProvider<C> {
    /// An unbounded pool.
    pub fn new(connector: C) -> Self {
        Self::with_max_idle(connector, None)
    }

    /// A pool that keeps at most `max_idle` idle sessions; extra sessions
    /// are dropped on release.
    pub fn with_max_idle(connector: C, max_idle: Option<usize>) -> Self {
        Self {
            connector,
            max_idle,
            state: Mutex::new(PoolState {
                profile: None,
                epoch: 0,
                idle: Vec::new(),
                metadata: ClientMetadata::new(),
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of idle sessions currently pooled.
    pub fn idle_count(&self) -> KmsResult<usize> {
        Ok(self.lock()?.idle.len())
    }

    /// Drop every idle session. Sessions checked out right now still come
    /// back to the pool on release.
    pub fn flush(&self) -> KmsResult<()> {
        let stale = std::mem::take(&mut self.lock()?.idle);
        drop_stale(stale);
        Ok(())
    }

    fn lock(&self) -> KmsResult<MutexGuard<'_, PoolState<C::Session>>> {
        self.state
            .lock()
            .map_err(|e| KmsError::Internal(format!("session pool lock poisoned: {e}")))
    }

    fn release(&self, session: C::Session, epoch: u64) {
        let Ok(mut state) = self.state.lock() else {
            warn!("session pool lock poisoned; dropping returned session");
            return;
        };
        if state.epoch != epoch {
            debug!(epoch, current = state.epoch, "discarding session from a previous profile");
            return;
        }
        if self.max_idle.is_some_and(|max| state.idle.len() >= max) {
            return;
        }
        state.idle.push(session);
    }
}

impl<C: Connector> KeySessionProvider for PooledSessionProvider<C> {
    fn acquire(&self) -> KmsResult<Box<dyn KeySession + '_>> {
        let (profile, metadata, epoch) = {
            let mut state = self.lock()?;
            let epoch = state.epoch;
            if let Some(mut session) = state.idle.pop() {
                session.set_client_metadata(&state.metadata);
                return Ok(Box::new(PooledSession {
                    provider: self,
                    session: Some(session),
                    epoch,
                }));
            }
            let profile = state.profile.clone().ok_or(KmsError::NoActiveCredential)?;
            (profile, state.metadata.clone(), epoch)
        };

        debug!(profile = %profile.id, "pool empty; authenticating a new session");
        let session = self.connector.connect(&profile, &metadata)?;
        Ok(Box::new(PooledSession {
            provider: self,
            session: Some(session),
            epoch,
        }))
    }

    fn set_profile(&self, profile: Profile) -> KmsResult<()> {
        profile.validate()?;
        let stale = {
            let mut state = self.lock()?;
            state.epoch += 1;
            info!(profile = %profile.id, epoch = state.epoch, "session pool profile changed");
            state.profile = Some(profile);
            std::mem::take(&mut state.idle)
        };
        drop_stale(stale);
        Ok(())
    }

    fn client_metadata(&self) -> KmsResult<ClientMetadata> {
        Ok(self.lock()?.metadata.clone())
    }

    fn set_client_metadata(&self, metadata: ClientMetadata) -> KmsResult<()> {
        self.lock()?.metadata = metadata;
        Ok(())
    }
}

// Sessions are dropped after the pool lock is released.
fn drop_stale<S>(stale: Vec<S>) {
    debug!(dropped = stale.len(), "session pool flushed");
}

/// A pooled session checked out by one caller. Returned to the pool on drop.
pub struct PooledSession<'a, C: Connector> {
    provider: &'a PooledSessionProvider<C>,
    session: Option<C::Session>,
    epoch: u64,
}

impl<C: Connector> PooledSession<'_, C> {
    fn inner(&mut self) -> KmsResult<&mut C::Session> {
        self.session
            .as_mut()
            .ok_or_else(|| KmsError::Internal("pooled session already released".into()))
    }
}

impl<C: Connector> KeySession for PooledSession<'_, C> {
    fn mint(&mut self, request: &KeyRequest) -> KmsResult<ContentKey> {
        self.inner()?.mint(request)
    }

    fn resolve(&mut self, id: &KeyId) -> KmsResult<ContentKey> {
        self.inner()?.resolve(id)
    }

    fn set_client_metadata(&mut self, metadata: &ClientMetadata) {
        if let Some(session) = self.session.as_mut() {
            session.set_client_metadata(metadata);
        }
    }

    fn profile_id(&self) -> &str {
        self.session.as_ref().map_or("", |s| s.profile_id())
    }
}

impl<C: Connector> Drop for PooledSession<'_, C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.provider.release(session, self.epoch);
        }
    }
}

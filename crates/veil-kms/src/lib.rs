//! Key-service sessions for Veil.
//!
//! Minting and resolving content keys needs an authenticated session with
//! the key service, and authenticating is expensive. This crate hides that
//! cost behind [`KeySessionProvider`], with two interchangeable strategies:
//!
//! - [`TemplateSessionProvider`] -- authenticates once per profile and hands
//!   out clones of the resulting template. Deriving a copy does no I/O and
//!   shares no mutable state. This is the default.
//! - [`PooledSessionProvider`] -- keeps a mutex-guarded stack of
//!   authenticated sessions. Use it when cloning a session is not cheap.
//!
//! Profiles come from a [`ProfileStore`]; [`InMemoryKeyService`] is a
//! complete key service for tests and embedding.
//!
//! # Design Rules
//!
//! 1. Without a configured profile every mint and resolve fails with
//!    [`KmsError::NoActiveCredential`], immediately.
//! 2. Handing out a session never performs a handshake unless the pool is
//!    empty.
//! 3. A session is owned by exactly one caller at a time.
//! 4. After a profile change no session bound to the old profile is reused.

pub mod error;
pub mod memory;
pub mod pool;
pub mod profile;
pub mod session;
pub mod template;

pub use error::{KmsError, KmsResult, DENIED_CODE};
pub use memory::{InMemoryConnector, InMemoryKeyService, InMemorySession};
pub use pool::{PooledSession, PooledSessionProvider};
pub use profile::{PlaintextProfileFile, Profile, ProfileSet, ProfileStore, StaticProfileStore};
pub use session::{ClientMetadata, Connector, ContentKey, KeyRequest, KeySession, KeySessionProvider};
pub use template::TemplateSessionProvider;

//! Envelope encryption for object storage.
//!
//! [`EncryptedStorage`] wraps any [`veil_store::ObjectStorage`] and gives
//! every object it writes its own content key. Keys are minted by a key
//! service through a [`veil_kms::KeySessionProvider`]; the key id is kept
//! in the object's metadata under [`KEY_ID_METADATA`] and the key itself is
//! handed to the backing store as a customer-supplied encryption key. The
//! backing store never sees a key it could keep, and the key service never
//! sees a payload.
//!
//! ```text
//! write:  attributes ──► mint ──► stamp metadata ──► store(payload, key)
//! read:   get metadata ──► key id? ──► resolve ──► read(payload, key)
//! ```
//!
//! # Design Rules
//!
//! 1. Every payload written through the facade is protected by a freshly
//!    minted key; two objects never share one.
//! 2. An object without a key reference is read as stored, without asking
//!    the key service.
//! 3. An object with a key reference is never read without that key. Any
//!    key-service failure fails the read.
//! 4. Nothing is written to the backing store when minting fails.
//! 5. Metadata-only updates are forwarded as-is, even when they overwrite
//!    the key reference.
//! 6. Settings are copied in and out under a lock; one call never sees
//!    half of an update.

pub mod binding;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod options;
pub mod storage;

pub use binding::{extract, is_protected, stamp, KEY_ID_METADATA};
pub use config::{EnvelopeConfig, SessionStrategy};
pub use error::{key_service_error, EnvelopeError, EnvelopeResult};
pub use lifecycle::{merge_attributes, mint_for_write, resolve_for_read, LifecycleSettings, Minted};
pub use options::prepend_option;
pub use storage::EncryptedStorage;

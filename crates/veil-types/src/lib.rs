//! Foundation types for Veil.
//!
//! Veil is an envelope-encryption layer that sits in front of an object
//! store. Every other Veil crate depends on `veil-types` for the vocabulary
//! shared between the storage side and the key-service side.
//!
//! # Key Types
//!
//! - [`ObjectRef`] -- bucket + name (+ optional generation) identifying a stored object
//! - [`ObjectMetadata`] -- caller-defined string metadata attached to an object
//! - [`KeyAttributes`] -- attribute map carried by a content key
//! - [`KeyId`] -- opaque content-key identifier issued by the key service
//! - [`KeySecret`] -- 256-bit symmetric key material, zeroized on drop

pub mod attributes;
pub mod error;
pub mod key;
pub mod object;

pub use attributes::KeyAttributes;
pub use error::TypeError;
pub use key::{KeyId, KeySecret, KEY_SECRET_LEN};
pub use object::{ObjectMetadata, ObjectRef};

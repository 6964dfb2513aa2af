//! Object-storage interface for Veil.
//!
//! [`ObjectStorage`] is the full operation surface of a bucket/object
//! service: buckets, object payloads and metadata, compose and copy, signed
//! URLs, access control, IAM and HMAC key administration. Payload-bearing
//! operations accept a customer-supplied encryption key through their
//! option slices ([`TargetOption::EncryptionKey`],
//! [`WriteOption::EncryptionKey`], [`SourceOption::DecryptionKey`]).
//!
//! # Storage Backends
//!
//! - [`InMemoryStorage`] -- lock-guarded store for tests and embedding. It
//!   seals keyed payloads with AES-256-GCM and keeps only the key's SHA-256
//!   fingerprint, so reading with a missing or wrong key fails the same way
//!   it would against a remote store. Administrative calls (access control,
//!   HMAC keys, retention locks, URL signing) are only recorded.
//!
//! # Design Rules
//!
//! 1. Metadata-only calls never need an object's key.
//! 2. Preconditions are checked under the same lock as the change they guard.
//! 3. Write channels store nothing until closed.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod channel;
mod csek;
pub mod error;
pub mod memory;
pub mod model;
pub mod options;
pub mod traits;

pub use channel::{BufferedReadChannel, ReadChannel, WriteChannel};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStorage, RecordedCall};
pub use model::{
    Acl, AclEntity, AclRole, AclScope, Bucket, BucketInfo, ComposeRequest, CopyRequest,
    CustomerEncryption, HmacKey, HmacKeyMetadata, HmacKeyState, IamPolicy, Object, ObjectField,
    ObjectInfo, Page, ServiceAccount,
};
pub use options::{
    find_customer_key, preconditions, BucketOption, CallOption, EncodedKey, GetOption, ListOption,
    Precondition, SignUrlOption, SourceOption, TargetOption, WriteOption,
};
pub use traits::ObjectStorage;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veil_types::{ObjectMetadata, ObjectRef};

use crate::options::{SourceOption, TargetOption};

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// Caller-supplied description of a bucket.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub location: Option<String>,
    pub storage_class: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Minimum retention, in seconds, applied to objects in the bucket.
    pub retention_period: Option<u64>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A bucket as reported by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub info: BucketInfo,
    pub metageneration: i64,
    pub retention_locked: bool,
    pub created: DateTime<Utc>,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Caller-supplied description of an object: where it lives and the
/// metadata to attach to it.
///
/// `metadata` is optional because a store distinguishes "no metadata map"
/// from "an empty map". On update, `None` fields are left as they are,
/// given metadata entries are merged over the existing ones, and the names
/// in `removed_metadata` are deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: ObjectRef,
    pub content_type: Option<String>,
    pub metadata: Option<ObjectMetadata>,
    /// Metadata entries to delete. Only meaningful for updates.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub removed_metadata: BTreeSet<String>,
}

impl ObjectInfo {
    pub fn new(id: ObjectRef) -> Self {
        Self {
            id,
            content_type: None,
            metadata: None,
            removed_metadata: BTreeSet::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ObjectMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add a single metadata entry, creating the map if needed.
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(ObjectMetadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// Ask an update to delete the metadata entry `key`.
    pub fn without_metadata_entry(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.remove(&key);
        }
        self.removed_metadata.insert(key);
        self
    }

    /// Apply this info to `current` as an update: set fields replace,
    /// unset fields are kept.
    pub fn patch(&self, current: &mut ObjectInfo) {
        if let Some(content_type) = &self.content_type {
            current.content_type = Some(content_type.clone());
        }
        if let Some(metadata) = &self.metadata {
            current
                .metadata
                .get_or_insert_with(ObjectMetadata::new)
                .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(metadata) = current.metadata.as_mut() {
            metadata.retain(|k, _| !self.removed_metadata.contains(k));
        }
    }
}

/// Customer-supplied encryption details reported for a sealed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerEncryption {
    pub algorithm: String,
    /// Base64 SHA-256 of the key the object was sealed with.
    pub key_sha256: String,
}

/// An object as reported by the store (metadata only, never the payload).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub info: ObjectInfo,
    pub generation: i64,
    pub metageneration: i64,
    pub size: u64,
    /// Hex SHA-256 of the plaintext payload.
    pub sha256_hex: Option<String>,
    pub customer_encryption: Option<CustomerEncryption>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Object {
    /// Reference pinned to this object's generation.
    pub fn id(&self) -> ObjectRef {
        self.info.id.latest().with_generation(self.generation)
    }

    pub fn metadata(&self) -> Option<&ObjectMetadata> {
        self.info.metadata.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.info.content_type.as_deref()
    }
}

/// Object fields selectable with [`crate::GetOption::Fields`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectField {
    ContentType,
    Metadata,
    Checksum,
    CustomerEncryption,
}

/// One page of a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn single(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }
}

/// Concatenate several source objects of one bucket into a target.
#[derive(Clone, Debug)]
pub struct ComposeRequest {
    pub sources: Vec<ObjectRef>,
    pub target: ObjectInfo,
    pub target_options: Vec<TargetOption>,
}

/// Copy one object to another location.
#[derive(Clone, Debug)]
pub struct CopyRequest {
    pub source: ObjectRef,
    pub source_options: Vec<SourceOption>,
    pub target: ObjectInfo,
    pub target_options: Vec<TargetOption>,
}

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// What an ACL list is attached to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AclScope {
    /// The bucket's own ACL.
    Bucket(String),
    /// Default ACL applied to new objects in the bucket.
    DefaultObject(String),
    /// A single object's ACL.
    Object(ObjectRef),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AclEntity {
    User(String),
    Group(String),
    Domain(String),
    AllUsers,
    AllAuthenticatedUsers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclRole {
    Reader,
    Writer,
    Owner,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub entity: AclEntity,
    pub role: AclRole,
}

impl Acl {
    pub fn new(entity: AclEntity, role: AclRole) -> Self {
        Self { entity, role }
    }
}

/// Bucket-level IAM policy: role → members.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamPolicy {
    pub bindings: BTreeMap<String, BTreeSet<String>>,
    pub version: i64,
}

impl IamPolicy {
    pub fn with_binding(mut self, role: impl Into<String>, member: impl Into<String>) -> Self {
        self.bindings
            .entry(role.into())
            .or_default()
            .insert(member.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub email: String,
}

// ---------------------------------------------------------------------------
// HMAC keys
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HmacKeyState {
    Active,
    Inactive,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmacKeyMetadata {
    pub access_id: String,
    pub service_account: String,
    pub state: HmacKeyState,
    pub created: DateTime<Utc>,
}

/// A freshly created HMAC key. The secret is only ever returned once.
#[derive(Clone, Serialize, Deserialize)]
pub struct HmacKey {
    pub secret: String,
    pub metadata: HmacKeyMetadata,
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacKey")
            .field("secret", &"<redacted>")
            .field("metadata", &self.metadata)
            .finish()
    }
}

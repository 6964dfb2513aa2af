//! Mint-on-write and resolve-on-read.

use tracing::debug;
use veil_kms::{ContentKey, KeyRequest, KeySessionProvider, KmsResult};
use veil_store::{GetOption, ObjectField, ObjectStorage, StoreError, StoreResult};
use veil_types::{KeyAttributes, ObjectMetadata, ObjectRef};

use crate::binding::{self, KEY_ID_METADATA};
use crate::error::key_service_failure;

/// Facade settings that shape every minted key. Copied out of the facade
/// per call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub default_attributes: KeyAttributes,
    pub metadata_capture: bool,
}

/// A freshly minted key and the object metadata that references it.
#[derive(Debug)]
pub struct Minted {
    pub key: ContentKey,
    pub metadata: ObjectMetadata,
}

/// Attributes for a new key, lowest priority first: captured object
/// metadata, then defaults, then the caller's own attributes.
///
/// The reserved key-id entry is never captured.
pub fn merge_attributes(
    metadata: Option<&ObjectMetadata>,
    settings: &LifecycleSettings,
    per_call: &KeyAttributes,
) -> KeyAttributes {
    let mut merged = match metadata {
        Some(md) if settings.metadata_capture => {
            let mut captured = KeyAttributes::from_metadata(md);
            captured.remove(KEY_ID_METADATA);
            captured
        }
        _ => KeyAttributes::new(),
    };
    merged.overlay(&settings.default_attributes);
    merged.overlay(per_call);
    merged
}

/// Mint a key for an object about to be written and stamp its id into a
/// copy of the object's metadata.
///
/// Mutable attributes come from `request` alone; defaults never reach them.
pub fn mint_for_write(
    provider: &dyn KeySessionProvider,
    settings: &LifecycleSettings,
    metadata: Option<&ObjectMetadata>,
    request: &KeyRequest,
) -> KmsResult<Minted> {
    let attributes = merge_attributes(metadata, settings, &request.attributes);
    let key = provider.mint(&KeyRequest {
        ref_id: request.ref_id.clone(),
        attributes,
        mutable_attributes: request.mutable_attributes.clone(),
    })?;
    let metadata = binding::stamp(metadata, &key.id);
    Ok(Minted { key, metadata })
}

/// The content key protecting `id`, or `None` if the object is unprotected.
///
/// Fetches metadata only. Any key-service failure fails the read; there is
/// no fallback to an undecrypted read.
pub fn resolve_for_read<S>(
    storage: &S,
    provider: &dyn KeySessionProvider,
    id: &ObjectRef,
) -> StoreResult<Option<ContentKey>>
where
    S: ObjectStorage + ?Sized,
{
    let object = storage
        .get_object(id, &[GetOption::Fields(vec![ObjectField::Metadata])])?
        .ok_or_else(|| StoreError::ObjectNotFound(id.clone()))?;

    let key_id = binding::extract(object.metadata()).map_err(|e| {
        StoreError::InvalidArgument(format!("object {id} has a broken {KEY_ID_METADATA}: {e}"))
    })?;
    let Some(key_id) = key_id else {
        debug!(object = %id, "no key reference; reading unprotected object");
        return Ok(None);
    };

    let key = provider.resolve(&key_id).map_err(key_service_failure)?;
    debug!(object = %id, key_id = %key.id, "content key resolved");
    Ok(Some(key))
}

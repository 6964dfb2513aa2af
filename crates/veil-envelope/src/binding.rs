//! Binding of a content key to its object through object metadata.
//!
//! One reserved metadata entry, [`KEY_ID_METADATA`], carries the key id.
//! Every other entry belongs to the caller. An object without the entry is
//! unprotected.

use veil_types::{KeyId, ObjectMetadata, TypeError};

/// Reserved metadata entry holding the content-key id.
pub const KEY_ID_METADATA: &str = "encryption-key-id";

/// A copy of `metadata` (or a fresh map) with the key id set. The input is
/// never modified.
pub fn stamp(metadata: Option<&ObjectMetadata>, id: &KeyId) -> ObjectMetadata {
    let mut stamped = metadata.cloned().unwrap_or_default();
    stamped.insert(KEY_ID_METADATA.to_string(), id.as_str().to_string());
    stamped
}

/// The key id recorded in `metadata`.
///
/// A missing map or a missing entry yields `Ok(None)`. An entry that is
/// present but empty is a broken reference and an error.
pub fn extract(metadata: Option<&ObjectMetadata>) -> Result<Option<KeyId>, TypeError> {
    metadata
        .and_then(|md| md.get(KEY_ID_METADATA))
        .map(|raw| KeyId::new(raw.as_str()))
        .transpose()
}

pub fn is_protected(metadata: Option<&ObjectMetadata>) -> bool {
    metadata.is_some_and(|md| md.contains_key(KEY_ID_METADATA))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> KeyId {
        KeyId::new(id).unwrap()
    }

    #[test]
    fn stamp_copies_and_sets() {
        let mut md = ObjectMetadata::new();
        md.insert("owner".into(), "alice".into());
        let stamped = stamp(Some(&md), &key("k1"));
        assert_eq!(stamped[KEY_ID_METADATA], "k1");
        assert_eq!(stamped["owner"], "alice");
        assert!(!md.contains_key(KEY_ID_METADATA));
    }

    #[test]
    fn stamp_without_metadata_creates_map() {
        let stamped = stamp(None, &key("k1"));
        assert_eq!(stamped.len(), 1);
    }

    #[test]
    fn stamp_replaces_previous_reference() {
        let first = stamp(None, &key("old"));
        let second = stamp(Some(&first), &key("new"));
        assert_eq!(second[KEY_ID_METADATA], "new");
    }

    #[test]
    fn extract_absent_reference() {
        assert_eq!(extract(None), Ok(None));
        assert_eq!(extract(Some(&ObjectMetadata::new())), Ok(None));
        assert!(!is_protected(None));
    }

    #[test]
    fn extract_present_reference() {
        let md = stamp(None, &key("k9"));
        assert_eq!(extract(Some(&md)), Ok(Some(key("k9"))));
        assert!(is_protected(Some(&md)));
    }

    #[test]
    fn extract_empty_reference_is_error() {
        let mut md = ObjectMetadata::new();
        md.insert(KEY_ID_METADATA.into(), String::new());
        assert_eq!(extract(Some(&md)), Err(TypeError::EmptyKeyId));
    }
}

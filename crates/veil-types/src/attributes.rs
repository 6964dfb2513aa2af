use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object::ObjectMetadata;

/// Attribute map carried by a content key: name → ordered list of values.
///
/// The key service evaluates its access policy against these attributes, so
/// value order is preserved exactly as supplied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyAttributes(BTreeMap<String, Vec<String>>);

impl KeyAttributes {
    /// An empty attribute map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Promote object metadata into attributes, each value wrapped as a
    /// single-element list.
    pub fn from_metadata(metadata: &ObjectMetadata) -> Self {
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), vec![v.clone()]))
            .collect()
    }

    /// Insert (or replace) an attribute.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) -> Option<Vec<String>> {
        self.0.insert(name.into(), values)
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, values: &[&str]) -> Self {
        self.insert(name, values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }

    /// Overlay `other` onto `self`. On a name collision the value from
    /// `other` wins and replaces the whole list.
    pub fn overlay(&mut self, other: &KeyAttributes) {
        for (name, values) in &other.0 {
            self.0.insert(name.clone(), values.clone());
        }
    }
}

impl From<BTreeMap<String, Vec<String>>> for KeyAttributes {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for KeyAttributes {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<'a> IntoIterator for &'a KeyAttributes {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_metadata_wraps_single_values() {
        let mut md = ObjectMetadata::new();
        md.insert("k".into(), "v".into());
        md.insert("owner".into(), "alice".into());
        let attrs = KeyAttributes::from_metadata(&md);
        assert_eq!(attrs.get("k"), Some(&["v".to_string()][..]));
        assert_eq!(attrs.get("owner"), Some(&["alice".to_string()][..]));
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn overlay_replaces_whole_list() {
        let mut base = KeyAttributes::new().with("classification", &["internal", "draft"]);
        let top = KeyAttributes::new().with("classification", &["restricted"]);
        base.overlay(&top);
        assert_eq!(base.get("classification"), Some(&["restricted".to_string()][..]));
    }

    #[test]
    fn overlay_keeps_disjoint_names() {
        let mut base = KeyAttributes::new().with("a", &["1"]);
        base.overlay(&KeyAttributes::new().with("b", &["2"]));
        assert!(base.contains_key("a"));
        assert!(base.contains_key("b"));
    }

    #[test]
    fn value_order_is_preserved() {
        let attrs = KeyAttributes::new().with("list", &["z", "a", "m"]);
        assert_eq!(attrs.get("list").unwrap(), &["z", "a", "m"]);
    }

    #[test]
    fn serde_is_a_plain_map() {
        let attrs = KeyAttributes::new().with("privacy", &["confidential", "secured"]);
        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"privacy":["confidential","secured"]}"#);
    }

    proptest! {
        #[test]
        fn overlay_top_always_wins(
            base in proptest::collection::btree_map("[a-d]", proptest::collection::vec("[a-z]{1,4}", 0..3), 0..4),
            top in proptest::collection::btree_map("[a-d]", proptest::collection::vec("[a-z]{1,4}", 0..3), 0..4),
        ) {
            let mut merged = KeyAttributes::from(base.clone());
            merged.overlay(&KeyAttributes::from(top.clone()));
            for (name, values) in &top {
                prop_assert_eq!(merged.get(name), Some(values.as_slice()));
            }
            for (name, values) in &base {
                if !top.contains_key(name) {
                    prop_assert_eq!(merged.get(name), Some(values.as_slice()));
                }
            }
        }
    }
}

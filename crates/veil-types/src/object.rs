use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Caller-defined metadata attached to a stored object.
///
/// Ordering is irrelevant to the store; a `BTreeMap` keeps iteration (and
/// therefore logs and test output) deterministic.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Identifies a stored object: a bucket, an object name within that bucket,
/// and optionally a specific generation.
///
/// When `generation` is `None` the latest generation is addressed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

impl ObjectRef {
    /// Reference the latest generation of `bucket/name`.
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            generation: None,
        }
    }

    /// Pin this reference to a specific generation.
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// The same object without a generation pin.
    pub fn latest(&self) -> Self {
        Self::new(self.bucket.clone(), self.name.clone())
    }

    /// Parse `bucket/name` (the name may itself contain `/`).
    pub fn parse(path: &str) -> Result<Self, TypeError> {
        let (bucket, name) = path
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidObjectRef(path.to_string()))?;
        if bucket.is_empty() || name.is_empty() {
            return Err(TypeError::InvalidObjectRef(path.to_string()));
        }
        Ok(Self::new(bucket, name))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({self})")
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            Some(generation) => write!(f, "{}/{}#{generation}", self.bucket, self.name),
            None => write!(f, "{}/{}", self.bucket, self.name),
        }
    }
}

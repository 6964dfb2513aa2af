use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use veil_kms::{
    ClientMetadata, Connector, KeySessionProvider, PooledSessionProvider, TemplateSessionProvider,
};
use veil_types::KeyAttributes;

use crate::error::EnvelopeResult;

/// How the facade obtains authenticated key-service sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionStrategy {
    /// Authenticate once and clone the template per call.
    #[default]
    Template,
    /// Keep a stack of authenticated sessions. `max_idle` bounds how many
    /// are kept between calls.
    Pooled { max_idle: Option<usize> },
}

/// Configuration for an [`crate::EncryptedStorage`] facade.
///
/// ```toml
/// metadata_capture = true
///
/// [default_attributes]
/// classification = ["restricted"]
///
/// [session_strategy]
/// kind = "pooled"
/// max_idle = 8
///
/// [client_metadata]
/// application-name = "billing-exporter"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Promote each object's own metadata into its key's attributes.
    pub metadata_capture: bool,
    /// Attributes merged into every minted key.
    pub default_attributes: KeyAttributes,
    pub session_strategy: SessionStrategy,
    /// Sent with every key-service request.
    pub client_metadata: ClientMetadata,
}

impl EnvelopeConfig {
    pub fn from_toml_str(raw: &str) -> EnvelopeResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> EnvelopeResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> EnvelopeResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Build the session provider this configuration selects, with the
    /// client metadata already applied. No profile is set yet.
    pub fn build_provider<C>(&self, connector: C) -> EnvelopeResult<Arc<dyn KeySessionProvider>>
    where
        C: Connector + 'static,
        C::Session: Clone + Sync,
    {
        let provider: Arc<dyn KeySessionProvider> = match &self.session_strategy {
            SessionStrategy::Template => Arc::new(TemplateSessionProvider::new(connector)),
            SessionStrategy::Pooled { max_idle } => {
                Arc::new(PooledSessionProvider::with_max_idle(connector, *max_idle))
            }
        };
        provider.set_client_metadata(self.client_metadata.clone())?;
        Ok(provider)
    }
}

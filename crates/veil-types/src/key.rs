use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TypeError;

/// Length in bytes of a content-key secret (AES-256).
pub const KEY_SECRET_LEN: usize = 32;

/// Opaque content-key identifier issued by the key service.
///
/// This is the only piece of key state ever persisted next to an object.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Wrap a non-empty identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyKeyId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.0
    }
}

impl AsRef<str> for KeyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 256-bit symmetric key material. Zeroized on drop, redacted in `Debug`.
///
/// Never persisted: it only travels to the object store as a transient
/// customer-supplied key and back from the key service on lookup.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeySecret {
    bytes: [u8; KEY_SECRET_LEN],
}

impl KeySecret {
    /// Generate fresh random key material.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SECRET_LEN]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let bytes: [u8; KEY_SECRET_LEN] =
            bytes.try_into().map_err(|_| TypeError::InvalidLength {
                expected: KEY_SECRET_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SECRET_LEN] {
        &self.bytes
    }

    /// Standard base64, the transport encoding object stores expect for
    /// customer-supplied keys.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, TypeError> {
        let mut decoded = STANDARD
            .decode(encoded)
            .map_err(|e| TypeError::InvalidBase64(e.to_string()))?;
        let secret = Self::from_slice(&decoded);
        decoded.zeroize();
        secret
    }
}

impl fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySecret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_rejects_empty() {
        assert_eq!(KeyId::new(""), Err(TypeError::EmptyKeyId));
        assert_eq!(KeyId::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn key_id_serde_validates() {
        let id: KeyId = serde_json::from_str(r#""k-1""#).unwrap();
        assert_eq!(id.as_str(), "k-1");
        assert!(serde_json::from_str::<KeyId>(r#""""#).is_err());
    }

    #[test]
    fn generated_secrets_differ() {
        assert_ne!(KeySecret::generate(), KeySecret::generate());
    }

    #[test]
    fn base64_roundtrip() {
        let secret = KeySecret::from_bytes(core::array::from_fn(|i| i as u8));
        let encoded = secret.to_base64();
        assert_eq!(encoded, "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=");
        assert_eq!(KeySecret::from_base64(&encoded).unwrap(), secret);
    }

    #[test]
    fn from_base64_checks_length() {
        let short = STANDARD.encode([1u8; 16]);
        assert_eq!(
            KeySecret::from_base64(&short),
            Err(TypeError::InvalidLength {
                expected: 32,
                actual: 16
            })
        );
        assert!(matches!(
            KeySecret::from_base64("not base64!"),
            Err(TypeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn debug_is_redacted() {
        let secret = KeySecret::from_bytes([0xAB; 32]);
        let shown = format!("{secret:?}");
        assert!(!shown.contains("ab"));
        assert!(!shown.contains("AB"));
        assert_eq!(shown, "KeySecret(<redacted>)");
    }
}

//! Content signature value type

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 256-bit blake3 content digest.
///
/// Serialized as lowercase hex. Equality is exact byte equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(blake3::Hash);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Full lowercase hex form.
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// First 8 hex characters, for tables and log lines.
    pub fn short(&self) -> String {
        self.0.to_hex()[..8].to_string()
    }
}

impl From<blake3::Hash> for Signature {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash)
    }
}

/// Error parsing a hex signature.
#[derive(Debug, thiserror::Error)]
#[error("invalid signature {input:?}: expected 64 lowercase hex characters")]
pub struct ParseSignatureError {
    input: String,
}

impl FromStr for Signature {
    type Err = ParseSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Uppercase would not survive a save/load cycle byte-for-byte.
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(ParseSignatureError { input: s.into() });
        }
        blake3::Hash::from_hex(s)
            .map(Self)
            .map_err(|_| ParseSignatureError { input: s.into() })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.short())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Render an optional signature for diagnostics.
pub(crate) fn display_opt(sig: &Option<Signature>) -> String {
    match sig {
        Some(s) => s.short(),
        None => "<none>".into(),
    }
}

/// Serde adapter for an optional signature stored as `""` when absent.
pub(crate) mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Signature;

    pub fn serialize<S: Serializer>(
        sig: &Option<Signature>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match sig {
            Some(s) => serializer.serialize_str(&s.to_hex()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Signature>, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(None);
        }
        s.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let sig = Signature::from(blake3::hash(b"abc"));
        let hex = sig.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(hex.parse::<Signature>().unwrap(), sig);
    }

    #[test]
    fn short_length() {
        let sig = Signature::from(blake3::hash(b"abc"));
        assert_eq!(sig.short().len(), 8);
        assert!(sig.to_hex().starts_with(&sig.short()));
    }

    #[test]
    fn rejects_bad_hex() {
        assert!("xyz".parse::<Signature>().is_err());
        assert!("".parse::<Signature>().is_err());
        let upper = Signature::from(blake3::hash(b"abc")).to_hex().to_uppercase();
        assert!(upper.parse::<Signature>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let sig = Signature::from(blake3::hash(b"abc"));
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, format!("\"{}\"", sig.to_hex()));
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }
}

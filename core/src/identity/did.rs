//! # DID Validation
//!
//! Grammar check and parsing for decentralized identifiers of the form
//!
//! ```text
//! did:<method>:<method-specific-id>
//! ```
//!
//! - `method` is one or more lowercase ASCII letters or digits.
//! - `method-specific-id` is one or more ASCII letters, digits, `.`, `_`
//!   or `-`.
//!
//! This is narrower than DID Core allows (no `:` or `%` inside the id), and
//! that is the point: anything accepted here contains exactly two colons,
//! which keeps `"<did>:<nonce>"` challenge values unambiguous.
//!
//! ## Standards References
//!
//! - [DID Core v1.0](https://www.w3.org/TR/did-core/)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DID_SCHEME: &str = "did";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DidError {
    /// The string does not match `did:<method>:<id>`.
    #[error("invalid DID format: {0}")]
    InvalidFormat(String),
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Whether `did` matches the grammar. Never panics, never allocates.
///
/// ```
/// use anchor_core::identity::did::is_valid;
///
/// assert!(is_valid("did:web:example.com"));
/// assert!(!is_valid("did:Web:x"));
/// ```
pub fn is_valid(did: &str) -> bool {
    split(did).is_some()
}

/// The method segment, e.g. `"key"` for `did:key:z6Mk...`.
pub fn extract_method(did: &str) -> Result<&str, DidError> {
    split(did)
        .map(|(method, _)| method)
        .ok_or_else(|| DidError::InvalidFormat(did.to_string()))
}

/// The method-specific identifier, e.g. `"example.com"` for `did:web:example.com`.
pub fn extract_identifier(did: &str) -> Result<&str, DidError> {
    split(did)
        .map(|(_, id)| id)
        .ok_or_else(|| DidError::InvalidFormat(did.to_string()))
}

fn split(did: &str) -> Option<(&str, &str)> {
    let mut parts = did.splitn(3, ':');
    let scheme = parts.next()?;
    let method = parts.next()?;
    let id = parts.next()?;

    if scheme != DID_SCHEME {
        return None;
    }
    if method.is_empty()
        || !method
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return None;
    }
    if id.is_empty()
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return None;
    }
    Some((method, id))
}

// ---------------------------------------------------------------------------
// Did
// ---------------------------------------------------------------------------

/// A DID string that has passed [`is_valid`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn parse(did: &str) -> Result<Self, DidError> {
        if is_valid(did) {
            Ok(Self(did.to_string()))
        } else {
            Err(DidError::InvalidFormat(did.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &str {
        // Validated at construction.
        split(&self.0).map(|(m, _)| m).unwrap_or_default()
    }

    pub fn identifier(&self) -> &str {
        split(&self.0).map(|(_, id)| id).unwrap_or_default()
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = DidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(DidError::InvalidFormat(value))
        }
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_examples() {
        assert!(is_valid("did:key:z6MkAbc"));
        assert!(is_valid("did:web:example.com"));
        assert!(is_valid("did:anchor:user_01-a.b"));
        assert!(is_valid("did:3:x"));
    }

    #[test]
    fn test_invalid_examples() {
        assert!(!is_valid("did:Web:x"));
        assert!(!is_valid("did::x"));
        assert!(!is_valid("did:web:"));
        assert!(!is_valid("did:web"));
        assert!(!is_valid("DID:web:x"));
        assert!(!is_valid("did:web:a:b"));
        assert!(!is_valid("did:web:a b"));
        assert!(!is_valid("did:web:caf\u{e9}"));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_extract_parts() {
        assert_eq!(extract_method("did:web:example.com").unwrap(), "web");
        assert_eq!(extract_identifier("did:web:example.com").unwrap(), "example.com");
    }

    #[test]
    fn test_extract_rejects_invalid() {
        assert!(matches!(
            extract_method("did:Web:x"),
            Err(DidError::InvalidFormat(_))
        ));
        assert!(extract_identifier("not-a-did").is_err());
    }

    #[test]
    fn test_did_newtype_parts() {
        let did: Did = "did:key:z6Mk".parse().unwrap();
        assert_eq!(did.method(), "key");
        assert_eq!(did.identifier(), "z6Mk");
        assert_eq!(did.to_string(), "did:key:z6Mk");
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: Did = serde_json::from_str("\"did:web:a.b\"").unwrap();
        assert_eq!(ok.as_str(), "did:web:a.b");
        assert!(serde_json::from_str::<Did>("\"did:Web:a\"").is_err());
    }
}

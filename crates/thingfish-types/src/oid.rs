use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque identifier binding an object's bytes to its properties.
///
/// An `Oid` is a UUID. Parsing accepts any letter case (and the braced,
/// simple, or URN forms `uuid` understands); the canonical form is always
/// lower-case hyphenated, so two `Oid`s parsed from case variants of the same
/// string compare equal and hash identically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(uuid::Uuid);

impl Oid {
    /// Generate a fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse an identifier in any letter case.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        uuid::Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|e| TypeError::InvalidOid {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Canonical lower-case hyphenated form.
    pub fn to_canonical(&self) -> String {
        self.0.hyphenated().to_string()
    }

    /// Returns `true` if `other` names this object, ignoring case.
    ///
    /// Strings that are not UUIDs never match.
    pub fn matches_str(&self, other: &str) -> bool {
        Oid::parse(other).map(|o| o == *self).unwrap_or(false)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.0.hyphenated())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Oid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<uuid::Uuid> for Oid {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

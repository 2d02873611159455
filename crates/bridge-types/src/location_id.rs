// ============================================================================
// Location IDs
// ============================================================================
//
// A location ID names one party of the bridge: the cloud endpoint (a fixed,
// configured ID) or an on-prem client (a random token issued at registration).
// IDs end up in bus subjects and key store file names, so the alphabet is
// restricted to [A-Za-z0-9_-].
// ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one bridge party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationId(String);

impl LocationId {
    /// Validate and wrap an ID.
    pub fn parse(s: &str) -> Result<Self, LocationIdError> {
        if s.is_empty() {
            return Err(LocationIdError::Empty);
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(LocationIdError::InvalidCharacter(c));
        }
        Ok(Self(s.to_string()))
    }

    /// Fresh random client ID (simple-form UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LocationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for LocationId {
    type Err = LocationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LocationId {
    type Error = LocationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LocationId> for String {
    fn from(id: LocationId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing a location ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationIdError {
    Empty,
    InvalidCharacter(char),
}

impl std::fmt::Display for LocationIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationIdError::Empty => write!(f, "Location ID cannot be empty"),
            LocationIdError::InvalidCharacter(c) => {
                write!(f, "Location ID contains invalid character {:?}", c)
            }
        }
    }
}

impl std::error::Error for LocationIdError {}

//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the identities the sync
//! engine passes around. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RemoteId
// ============================================================================

/// Server-assigned identifier of a remote record
///
/// Opaque to the engine. A draft manifest has no `RemoteId` yet; the empty
/// string on disk is represented as `None` by the manifest accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace or path separators
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if id
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// Revision
// ============================================================================

/// Opaque version stamp of a remote record
///
/// The sentinel value [`Revision::DRAFT`] marks an entity that was created
/// locally and never persisted remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Sentinel revision of a never-published entity
    pub const DRAFT: &'static str = "draft";

    /// Create a new Revision
    ///
    /// # Errors
    /// Returns error if the revision is empty
    pub fn new(revision: impl Into<String>) -> Result<Self, DomainError> {
        let revision = revision.into();
        if revision.trim().is_empty() {
            return Err(DomainError::InvalidRevision(
                "Revision cannot be empty".to_string(),
            ));
        }
        Ok(Self(revision))
    }

    /// The draft sentinel
    #[must_use]
    pub fn draft() -> Self {
        Self(Self::DRAFT.to_string())
    }

    /// Returns true if this revision is the draft sentinel
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.0 == Self::DRAFT
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads a revision out of a remote JSON value (string or number)
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::new(s.clone()).ok(),
            serde_json::Value::Number(n) => Self::new(n.to_string()).ok(),
            _ => None,
        }
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::draft()
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Remote revisions are sometimes numeric; accept both on the way in.
impl TryFrom<serde_json::Value> for Revision {
    type Error = DomainError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Self::new(s),
            serde_json::Value::Number(n) => Self::new(n.to_string()),
            other => Err(DomainError::InvalidRevision(other.to_string())),
        }
    }
}

impl From<Revision> for String {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

// ============================================================================
// Identifier
// ============================================================================

/// Stable human-readable key of an entity or sub-element
///
/// Identifiers double as folder names on disk, so they may not contain path
/// separators and may not be `.` or `..`. Identifiers starting with
/// [`Identifier::SYSTEM_PREFIX`] belong to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Prefix reserved for platform-owned sub-elements
    pub const SYSTEM_PREFIX: char = '_';

    /// Create a new Identifier
    ///
    /// # Errors
    /// Returns error if the identifier is empty or cannot be used as a folder name
    pub fn new(identifier: impl Into<String>) -> Result<Self, DomainError> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(DomainError::InvalidIdentifier(
                "Identifier cannot be empty".to_string(),
            ));
        }
        if identifier == "." || identifier == ".." {
            return Err(DomainError::InvalidIdentifier(identifier));
        }
        if identifier
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(DomainError::InvalidIdentifier(format!(
                "Identifier contains a path separator: {identifier}"
            )));
        }
        Ok(Self(identifier))
    }

    /// Returns true if the identifier is platform-reserved
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0.starts_with(Self::SYSTEM_PREFIX)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

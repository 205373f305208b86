//! Deletion confirmation port
//!
//! When a mirrored folder disappears from disk, the engine asks through this
//! port whether the removal should be applied remotely. The CLI implements it
//! with a terminal prompt; [`AutoConfirm`] answers without asking.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use crate::domain::manifest::{EntityKind, SubElementKind};
use crate::domain::newtypes::Identifier;

/// What a deleted folder stood for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionTarget {
    /// An element of the owner's array (`methods/<id>`, `roles/<id>`)
    SubElement(SubElementKind),
    /// A whole entity folder (`tasks/<id>`, `classes/<pkg>/<id>`)
    Entity(EntityKind),
}

impl Display for DeletionTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeletionTarget::SubElement(kind) => write!(f, "{kind}"),
            DeletionTarget::Entity(kind) => write!(f, "{kind}"),
        }
    }
}

/// A pending deletion awaiting the developer's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    /// Folder that was removed
    pub path: PathBuf,
    /// Kind of thing the folder held
    pub target: DeletionTarget,
    /// Identifier of the removed element or entity (the folder name)
    pub identifier: Identifier,
    /// Identifier of the owning entity, for sub-elements
    pub owner: Option<Identifier>,
}

impl Display for DeletionRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{} '{}' of '{}'", self.target, self.identifier, owner),
            None => write!(f, "{} '{}'", self.target, self.identifier),
        }
    }
}

/// Port trait for deletion confirmation
#[async_trait::async_trait]
pub trait IDeletionPrompt: Send + Sync {
    /// Returns `true` to propagate the deletion, `false` to restore the folder
    async fn confirm(&self, request: &DeletionRequest) -> anyhow::Result<bool>;
}

/// Answers every request with a fixed value
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait::async_trait]
impl IDeletionPrompt for AutoConfirm {
    async fn confirm(&self, _request: &DeletionRequest) -> anyhow::Result<bool> {
        Ok(self.0)
    }
}

//! Path resolver
//!
//! Maps a changed path back to the remote entity (and sub-element) it
//! mirrors. Classification looks at file and folder names only; the owning
//! manifest is then found by walking parent directories, at most
//! [`MAX_OWNER_DEPTH`] levels up.
//!
//! ```text
//! classes/<pkg>/<class>/methods/<m>/scripts/script_2.js
//!                                   └── method <m> of class.json found 2 levels above <m>
//! ```

use std::path::{Path, PathBuf};

use lcsync_core::domain::{EntityKind, SubElementKind, FIELD_SCHEMA_FILE};

use crate::store::{parse_script_index, METHOD_FILE, ROLE_FILE, SCRIPTS_DIR};
use crate::{Result, SyncError};

/// How many parent directories the owner lookup inspects
pub const MAX_OWNER_DEPTH: usize = 5;

/// What a changed file contributes to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// A method or role; `dir` is the element folder
    SubElement { kind: SubElementKind, dir: PathBuf },
    /// The class's `fields.yaml`
    FieldSet { schema: PathBuf },
    /// The owner's own top-level keys (and a task's scripts)
    Entity,
}

/// A recognized path and the manifest that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Path that changed
    pub path: PathBuf,
    pub target: SyncTarget,
    /// Kind of the owning entity
    pub owner_kind: EntityKind,
    /// Owning manifest file
    pub owner_manifest: PathBuf,
}

/// Result of resolving a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(Resolution),
    /// Not a mirrored artifact; ignore silently
    NotRecognized,
}

/// Name-only classification of a file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub target: SyncTarget,
    pub owner_kind: EntityKind,
    /// Folder the owner lookup starts from
    pub search_from: PathBuf,
}

/// Mirrored folders that stand for a single element or entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirKind {
    /// `methods/<id>`
    Method,
    /// `roles/<id>`
    Role,
    /// `tasks/<id>`
    Task,
    /// `classes/<pkg>/<class>`
    Class,
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn parent_name(path: &Path) -> Option<&str> {
    path.parent().and_then(file_name)
}

/// Classifies a file by name and parent folder name
///
/// Does not touch the filesystem except to tell a method's scripts from a
/// task's when the folder names are ambiguous.
pub fn classify(path: &Path) -> Option<Classified> {
    let name = file_name(path)?;
    let parent = path.parent()?;

    if parse_script_index(name).is_some() && file_name(parent) == Some(SCRIPTS_DIR) {
        let owner_dir = parent.parent()?;
        return classify_script_owner(owner_dir);
    }

    let (target, owner_kind, search_from) = match name {
        METHOD_FILE => (
            SyncTarget::SubElement {
                kind: SubElementKind::Method,
                dir: parent.to_path_buf(),
            },
            EntityKind::Class,
            parent.to_path_buf(),
        ),
        FIELD_SCHEMA_FILE => (
            SyncTarget::FieldSet {
                schema: path.to_path_buf(),
            },
            EntityKind::Class,
            parent.to_path_buf(),
        ),
        ROLE_FILE if parent_name(parent) == Some(SubElementKind::Role.array_name()) => (
            SyncTarget::SubElement {
                kind: SubElementKind::Role,
                dir: parent.to_path_buf(),
            },
            EntityKind::ProcessVersion,
            parent.to_path_buf(),
        ),
        other => {
            let kind = EntityKind::from_manifest_file_name(other)?;
            (SyncTarget::Entity, kind, parent.to_path_buf())
        }
    };

    Some(Classified {
        target,
        owner_kind,
        search_from,
    })
}

fn classify_script_owner(owner_dir: &Path) -> Option<Classified> {
    let in_methods = parent_name(owner_dir) == Some(SubElementKind::Method.array_name());
    let in_tasks = parent_name(owner_dir) == Some("tasks");

    if owner_dir.join(METHOD_FILE).is_file() || (in_methods && !in_tasks) {
        return Some(Classified {
            target: SyncTarget::SubElement {
                kind: SubElementKind::Method,
                dir: owner_dir.to_path_buf(),
            },
            owner_kind: EntityKind::Class,
            search_from: owner_dir.to_path_buf(),
        });
    }

    let task_manifest = EntityKind::DiagramTask.manifest_file_name();
    if owner_dir.join(task_manifest).is_file() || in_tasks {
        return Some(Classified {
            target: SyncTarget::Entity,
            owner_kind: EntityKind::DiagramTask,
            search_from: owner_dir.to_path_buf(),
        });
    }

    None
}

/// Returns true if changes to `path` are worth a sync
pub fn is_recognized(path: &Path) -> bool {
    classify(path).is_some()
}

/// Walks up from `start` looking for the manifest of `kind`
pub fn find_owner_manifest(start: &Path, kind: EntityKind) -> Option<PathBuf> {
    let file = kind.manifest_file_name();
    start
        .ancestors()
        .take(MAX_OWNER_DEPTH)
        .map(|dir| dir.join(file))
        .find(|candidate| candidate.is_file())
}

/// Resolves a changed path to its owner
///
/// # Errors
/// [`SyncError::OwnerNotFound`] when the path is recognized but no manifest
/// of the expected kind exists within [`MAX_OWNER_DEPTH`] levels
pub fn resolve(path: &Path) -> Result<ResolveOutcome> {
    let Some(classified) = classify(path) else {
        return Ok(ResolveOutcome::NotRecognized);
    };

    let owner_manifest = find_owner_manifest(&classified.search_from, classified.owner_kind)
        .ok_or_else(|| SyncError::OwnerNotFound(path.to_path_buf()))?;

    Ok(ResolveOutcome::Resolved(Resolution {
        path: path.to_path_buf(),
        target: classified.target,
        owner_kind: classified.owner_kind,
        owner_manifest,
    }))
}

/// Classifies a folder that was created or removed
pub fn classify_dir(path: &Path) -> Option<DirKind> {
    file_name(path)?;
    match parent_name(path)? {
        "methods" => Some(DirKind::Method),
        "roles" => Some(DirKind::Role),
        "tasks" => Some(DirKind::Task),
        _ => {
            let grandparent = path.parent()?.parent()?;
            (file_name(grandparent) == Some("classes")).then_some(DirKind::Class)
        }
    }
}

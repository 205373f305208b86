//! Sync operations
//!
//! A [`SyncOperation`] describes one JSON-Patch style change to apply to a
//! remote record. Operations are built fresh for every sync cycle from a diff
//! between local state and a just-fetched remote snapshot; they are never
//! persisted.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::RemoteId;

/// Patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Insert a new value (append when the pointer ends in `-`)
    Add,
    /// Overwrite the value at the pointer
    Replace,
    /// Remove the value at the pointer
    Remove,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Add => "add",
            OperationKind::Replace => "replace",
            OperationKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Target location of an operation inside the remote record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointerPath {
    /// An element of an array-typed field at the index seen in the snapshot
    Index {
        /// Array field name
        array: &'static str,
        /// Position at fetch time
        index: usize,
    },
    /// Tail of an array-typed field; the remote appends
    Append {
        /// Array field name
        array: &'static str,
    },
    /// A top-level key of the record
    Key(String),
}

impl Display for PointerPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PointerPath::Index { array, index } => write!(f, "/{array}/{index}"),
            PointerPath::Append { array } => write!(f, "/{array}/-"),
            PointerPath::Key(key) => write!(f, "/{}", escape_pointer_token(key)),
        }
    }
}

/// Escapes a key for use as a JSON Pointer reference token (RFC 6901)
fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// One patch to apply to a remote entity
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOperation {
    /// Remote record the operation targets
    pub target_remote_id: RemoteId,
    /// add / replace / remove
    pub op: OperationKind,
    /// Where in the record
    pub path: PointerPath,
    /// New value; `None` for `remove`
    pub value: Option<Value>,
}

impl SyncOperation {
    /// Wire representation sent in a `patch` request
    #[must_use]
    pub fn to_patch(&self) -> PatchOperation {
        PatchOperation {
            op: self.op,
            path: self.path.to_string(),
            value: self.value.clone(),
        }
    }
}

impl Display for SyncOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.op, self.path, self.target_remote_id)
    }
}

/// JSON body of a single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// add / replace / remove
    pub op: OperationKind,
    /// JSON pointer, e.g. `/methods/3` or `/methods/-`
    pub path: String,
    /// New value, absent for `remove`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

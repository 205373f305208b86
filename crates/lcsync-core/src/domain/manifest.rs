//! Entity manifests and sub-elements
//!
//! An [`EntityManifest`] is the on-disk JSON shadow of a remote record. It keeps
//! the record's identity (`id`, `revision`, `identifier`) as typed fields and the
//! rest of the record as an untyped JSON body, so that unknown platform fields
//! survive a round trip untouched.
//!
//! ## Kinds
//!
//! | kind | remote class | manifest file | detached arrays |
//! |---|---|---|---|
//! | [`EntityKind::Class`] | `class` | `class.json` | `methods`, `fields` |
//! | [`EntityKind::ProcessVersion`] | `processVersion` | `version.json` | `roles` |
//! | [`EntityKind::DiagramTask`] | `diagramTask` | `task.json` | `scripts` |
//!
//! "Detached" arrays are stored in their own files and folders next to the
//! manifest rather than inside it.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::newtypes::{Identifier, RemoteId, Revision};

/// Record keys assigned by the server; never sent back on create.
pub const SERVER_MANAGED_FIELDS: &[&str] = &[
    "id",
    "revision",
    "createdAt",
    "createdBy",
    "updatedAt",
    "updatedBy",
];

/// Kind of remote entity mirrored locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// A class with methods and fields
    Class,
    /// A version of a process, with roles
    ProcessVersion,
    /// A diagram task belonging to a process version
    DiagramTask,
}

impl EntityKind {
    /// All kinds, in fetch order
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Class,
        EntityKind::ProcessVersion,
        EntityKind::DiagramTask,
    ];

    /// Entity class name used by the remote object store
    #[must_use]
    pub fn remote_class(self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::ProcessVersion => "processVersion",
            EntityKind::DiagramTask => "diagramTask",
        }
    }

    /// File name of the manifest inside the entity folder
    #[must_use]
    pub fn manifest_file_name(self) -> &'static str {
        match self {
            EntityKind::Class => "class.json",
            EntityKind::ProcessVersion => "version.json",
            EntityKind::DiagramTask => "task.json",
        }
    }

    /// Array-typed record keys stored outside the manifest file
    #[must_use]
    pub fn detached_arrays(self) -> &'static [&'static str] {
        match self {
            EntityKind::Class => &["methods", "fields"],
            EntityKind::ProcessVersion => &["roles"],
            EntityKind::DiagramTask => &["scripts"],
        }
    }

    /// Maps a manifest file name back to its kind
    #[must_use]
    pub fn from_manifest_file_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.manifest_file_name() == name)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_class())
    }
}

/// Kind of sub-element, addressed by identifier inside an entity array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubElementKind {
    /// A class method (`methods` array); its scripts live in `scripts/`
    Method,
    /// A class field (`fields` array), defined in `fields.yaml`
    Field,
    /// A process version role (`roles` array)
    Role,
}

impl SubElementKind {
    /// Name of the array on the owning record
    #[must_use]
    pub fn array_name(self) -> &'static str {
        match self {
            SubElementKind::Method => "methods",
            SubElementKind::Field => "fields",
            SubElementKind::Role => "roles",
        }
    }

    /// Kind of the entity that owns this sub-element
    #[must_use]
    pub fn owner_kind(self) -> EntityKind {
        match self {
            SubElementKind::Method | SubElementKind::Field => EntityKind::Class,
            SubElementKind::Role => EntityKind::ProcessVersion,
        }
    }

    /// Maps a container folder name (`methods`, `roles`) back to its kind
    ///
    /// Fields have no per-element folder and are not returned here.
    #[must_use]
    pub fn from_folder_name(name: &str) -> Option<Self> {
        match name {
            "methods" => Some(SubElementKind::Method),
            "roles" => Some(SubElementKind::Role),
            _ => None,
        }
    }
}

impl Display for SubElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubElementKind::Method => "method",
            SubElementKind::Field => "field",
            SubElementKind::Role => "role",
        };
        f.write_str(name)
    }
}

// ============================================================================
// EntityManifest
// ============================================================================

/// On-disk JSON shadow of a remote record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityManifest {
    /// Remote id; empty until the entity is published
    #[serde(default)]
    pub id: String,
    /// Opaque version stamp; [`Revision::DRAFT`] until published
    #[serde(default)]
    pub revision: Revision,
    /// Stable human-readable key
    pub identifier: Identifier,
    /// Everything else the remote record carries
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl EntityManifest {
    /// A new draft manifest with the given identifier and body
    pub fn draft(identifier: Identifier, body: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            revision: Revision::draft(),
            identifier,
            body,
        }
    }

    /// Builds a manifest from a remote record, dropping the detached arrays
    ///
    /// # Errors
    /// Returns error if the record is not an object or lacks a valid identifier
    pub fn from_remote(kind: EntityKind, record: &Value) -> Result<Self, DomainError> {
        let mut map = record
            .as_object()
            .cloned()
            .ok_or_else(|| DomainError::ValidationFailed(format!("{kind} record is not an object")))?;
        for key in kind.detached_arrays() {
            map.remove(*key);
        }
        serde_json::from_value(Value::Object(map))
            .map_err(|e| DomainError::ValidationFailed(format!("{kind} record: {e}")))
    }

    /// Returns the remote id, or `None` for a never-published draft
    #[must_use]
    pub fn remote_id(&self) -> Option<RemoteId> {
        RemoteId::new(self.id.clone()).ok()
    }

    /// Returns true if the manifest has never been published
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.revision.is_draft()
    }

    /// Overwrites identity with what the server answered
    pub fn accept_remote_identity(&mut self, remote_id: &RemoteId, revision: Revision) {
        self.id = remote_id.as_str().to_string();
        self.revision = revision;
    }

    /// Full record as JSON, including identity fields
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.body.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert(
            "revision".to_string(),
            Value::String(self.revision.as_str().to_string()),
        );
        map.insert(
            "identifier".to_string(),
            Value::String(self.identifier.as_str().to_string()),
        );
        Value::Object(map)
    }

    /// Record body with every server-managed key removed, for `create`
    #[must_use]
    pub fn to_create_payload(&self) -> Map<String, Value> {
        let mut map = self.body.clone();
        map.insert(
            "identifier".to_string(),
            Value::String(self.identifier.as_str().to_string()),
        );
        strip_server_fields(&mut map);
        map
    }
}

/// Removes [`SERVER_MANAGED_FIELDS`] from a record in place
pub fn strip_server_fields(map: &mut Map<String, Value>) {
    for key in SERVER_MANAGED_FIELDS {
        map.remove(*key);
    }
}

// ============================================================================
// SubElement
// ============================================================================

/// A method, field or role as stored locally (`method.json`, `role.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubElement {
    /// Key used to find the element inside the remote array
    pub identifier: Identifier,
    /// Remaining element properties
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl SubElement {
    /// A sub-element with only an identifier
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            body: Map::new(),
        }
    }

    /// The element as a JSON object, ready to be sent as a patch value
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = self.body.clone();
        map.insert(
            "identifier".to_string(),
            Value::String(self.identifier.as_str().to_string()),
        );
        Value::Object(map)
    }
}

/// Reads the `identifier` key of a remote array element
#[must_use]
pub fn element_identifier(element: &Value) -> Option<&str> {
    element.get("identifier").and_then(Value::as_str)
}

//! Domain entities and business logic
//!
//! This module contains the core domain types for lcsync:
//! - Newtypes for type-safe identifiers and validated domain types
//! - Entity manifests and sub-elements, the on-disk shadows of remote records
//! - Sync operations, the patches sent to the remote
//! - The declarative field schema read from `fields.yaml`
//! - Domain-specific error types

pub mod errors;
pub mod field_schema;
pub mod manifest;
pub mod newtypes;
pub mod operation;

// Re-export commonly used types
pub use errors::DomainError;
pub use field_schema::{FieldDescriptor, FieldSchema, FieldType, FIELD_SCHEMA_FILE};
pub use manifest::{
    element_identifier, strip_server_fields, EntityKind, EntityManifest, SubElement,
    SubElementKind, SERVER_MANAGED_FIELDS,
};
pub use newtypes::*;
pub use operation::{OperationKind, PatchOperation, PointerPath, SyncOperation};

//! Remote gateway port (driven/secondary port)
//!
//! This module defines the interface to the remote platform's entity store.
//! The sync engine never talks HTTP itself; it only sees this trait.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific;
//!   the engine wraps them into its own `SyncError` variants with entity context.
//! - Records are passed as raw `serde_json::Value` so that unknown platform
//!   fields round-trip untouched.
//! - No call is retried by the engine. A failed call fails that sync pass.

use serde_json::Value;

use crate::domain::newtypes::RemoteId;
use crate::domain::operation::PatchOperation;

/// Port trait for the remote entity store
///
/// `entity_class` is the remote class name (`class`, `processVersion`,
/// `diagramTask`), see `EntityKind::remote_class`.
#[async_trait::async_trait]
pub trait IRemoteGateway: Send + Sync {
    /// Fetches the current record
    ///
    /// # Returns
    /// The full record, including array-typed sub-element fields
    async fn get(&self, entity_class: &str, id: &RemoteId) -> anyhow::Result<Value>;

    /// Creates a record
    ///
    /// # Arguments
    /// * `payload` - Record body with no server-managed keys
    ///
    /// # Returns
    /// The created record; it carries the assigned `id` and `revision`
    async fn create(&self, entity_class: &str, payload: &Value) -> anyhow::Result<Value>;

    /// Applies patch operations to a record
    ///
    /// # Returns
    /// The updated record when the remote returns one
    async fn patch(
        &self,
        entity_class: &str,
        id: &RemoteId,
        operations: &[PatchOperation],
    ) -> anyhow::Result<Option<Value>>;

    /// Streams every record matching `query` in pages
    ///
    /// Results are sorted by `id`; each page after the first starts after the
    /// last hit of the previous page. `on_batch` is called once per non-empty
    /// page. Iteration stops at the first page shorter than `page_size`.
    async fn search_paginated(
        &self,
        entity_class: &str,
        query: &Value,
        page_size: u32,
        on_batch: &mut (dyn FnMut(Vec<Value>) + Send),
    ) -> anyhow::Result<()>;
}

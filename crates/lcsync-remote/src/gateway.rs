//! HttpRemoteGateway - IRemoteGateway implementation over the platform API
//!
//! Maps each port call to one `/entities` endpoint:
//!
//! | Port call          | Request                                  |
//! |--------------------|------------------------------------------|
//! | `get`              | `GET /entities/{class}/{id}`             |
//! | `create`           | `POST /entities/{class}`                 |
//! | `patch`            | `PATCH /entities/{class}/{id}`           |
//! | `search_paginated` | `POST /entities/{class}/_search` (paged) |
//!
//! ## Design Notes
//!
//! - Records stay raw `serde_json::Value`; only the search envelope is typed.
//! - Search pages are requested sorted by `id` and chained with the
//!   `searchAfter` cursor taken from the last hit of the previous page.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use lcsync_core::domain::newtypes::RemoteId;
use lcsync_core::domain::operation::PatchOperation;
use lcsync_core::ports::IRemoteGateway;

use crate::client::GatewayClient;
use crate::GatewayError;

/// Envelope of a `_search` response
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Value>,
}

/// Cursor that continues a search after `hit`
///
/// Prefers the hit's `sort` values when the platform returns them, else the
/// `id` the results are sorted by.
fn search_after(hit: &Value) -> Option<Value> {
    if let Some(sort) = hit.get("sort").filter(|s| s.is_array()) {
        return Some(sort.clone());
    }
    hit.get("id").map(|id| json!([id]))
}

/// Remote gateway backed by [`GatewayClient`]
#[derive(Clone)]
pub struct HttpRemoteGateway {
    client: GatewayClient,
}

impl HttpRemoteGateway {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    /// Requests one page of search results
    pub async fn search_page(
        &self,
        entity_class: &str,
        query: &Value,
        size: u32,
        cursor: Option<&Value>,
    ) -> Result<Vec<Value>, GatewayError> {
        let mut body = json!({
            "query": query,
            "size": size,
            "sort": [{ "id": "asc" }],
        });
        if let Some(cursor) = cursor {
            body["searchAfter"] = cursor.clone();
        }

        let response = self
            .client
            .post_json(&format!("/entities/{entity_class}/_search"), &body)
            .await?;
        let page: SearchResponse = serde_json::from_value(response).map_err(|e| {
            GatewayError::InvalidResponse(format!("search {entity_class}: {e}"))
        })?;
        Ok(page.hits)
    }
}

#[async_trait::async_trait]
impl IRemoteGateway for HttpRemoteGateway {
    #[instrument(skip(self), fields(id = %id))]
    async fn get(&self, entity_class: &str, id: &RemoteId) -> Result<Value> {
        self.client
            .get_json(&format!("/entities/{entity_class}/{id}"))
            .await
            .with_context(|| format!("Failed to fetch {entity_class} {id}"))
    }

    #[instrument(skip(self, payload))]
    async fn create(&self, entity_class: &str, payload: &Value) -> Result<Value> {
        let created = self
            .client
            .post_json(&format!("/entities/{entity_class}"), payload)
            .await
            .with_context(|| format!("Failed to create {entity_class}"))?;
        debug!(id = %created["id"], "Created {entity_class}");
        Ok(created)
    }

    #[instrument(skip(self, operations), fields(id = %id, operations = operations.len()))]
    async fn patch(
        &self,
        entity_class: &str,
        id: &RemoteId,
        operations: &[PatchOperation],
    ) -> Result<Option<Value>> {
        let body = json!({
            "id": id.as_str(),
            "operations": operations,
        });
        self.client
            .patch_json(&format!("/entities/{entity_class}/{id}"), &body)
            .await
            .with_context(|| format!("Failed to patch {entity_class} {id}"))
    }

    #[instrument(skip(self, query, on_batch))]
    async fn search_paginated(
        &self,
        entity_class: &str,
        query: &Value,
        page_size: u32,
        on_batch: &mut (dyn FnMut(Vec<Value>) + Send),
    ) -> Result<()> {
        let size = page_size.max(1);
        let mut cursor: Option<Value> = None;
        let mut pages = 0usize;

        loop {
            let hits = self
                .search_page(entity_class, query, size, cursor.as_ref())
                .await
                .with_context(|| format!("Failed to search {entity_class} (page {})", pages + 1))?;
            pages += 1;

            let count = hits.len();
            let next = hits.last().and_then(search_after);
            if count > 0 {
                on_batch(hits);
            }
            if count < size as usize {
                break;
            }
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(pages, "Search of {entity_class} complete");
        Ok(())
    }
}

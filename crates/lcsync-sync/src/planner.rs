//! Patch planner
//!
//! Compares what is on disk with a remote snapshot fetched moments before and
//! produces the smallest patch that makes the remote match. Array positions are
//! always looked up by `identifier` in the snapshot passed in; nothing is
//! remembered between calls.

use serde_json::{Map, Value};

use lcsync_core::domain::{
    element_identifier, EntityKind, FieldSchema, OperationKind, PointerPath, RemoteId,
    SyncOperation, SERVER_MANAGED_FIELDS,
};

use crate::store::LocalElement;

/// Result of planning one local element
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// The remote must change
    Operation(SyncOperation),
    /// The remote element already equals the local one
    Unchanged,
    /// System-reserved element with nothing local to push
    Skipped,
}

impl PlanOutcome {
    /// The operation, if any
    pub fn into_operation(self) -> Option<SyncOperation> {
        match self {
            PlanOutcome::Operation(op) => Some(op),
            PlanOutcome::Unchanged | PlanOutcome::Skipped => None,
        }
    }
}

/// Position and value of the element with `identifier` in `snapshot[array]`
pub fn find_element<'a>(
    snapshot: &'a Value,
    array: &str,
    identifier: &str,
) -> Option<(usize, &'a Value)> {
    snapshot
        .get(array)?
        .as_array()?
        .iter()
        .enumerate()
        .find(|(_, element)| element_identifier(element) == Some(identifier))
}

fn plan_element(
    target: &RemoteId,
    array: &'static str,
    identifier: &str,
    value: Value,
    snapshot: &Value,
) -> PlanOutcome {
    let (op, path) = match find_element(snapshot, array, identifier) {
        Some((_, remote)) if *remote == value => return PlanOutcome::Unchanged,
        Some((index, _)) => (OperationKind::Replace, PointerPath::Index { array, index }),
        None => (OperationKind::Add, PointerPath::Append { array }),
    };
    PlanOutcome::Operation(SyncOperation {
        target_remote_id: target.clone(),
        op,
        path,
        value: Some(value),
    })
}

/// Plans a method or role against the owner's snapshot
///
/// A match by identifier yields `replace` at the element's current index; no
/// match yields `add` at the end of the array.
pub fn plan_sub_element(target: &RemoteId, local: &LocalElement, snapshot: &Value) -> PlanOutcome {
    let identifier = &local.element.identifier;
    if identifier.is_system() && !local.has_content {
        return PlanOutcome::Skipped;
    }
    plan_element(
        target,
        local.kind.array_name(),
        identifier.as_str(),
        local.element.to_value(),
        snapshot,
    )
}

/// Plans every declared field independently against the same snapshot
///
/// Remote fields that are not declared locally are left alone.
pub fn plan_fields(target: &RemoteId, schema: &FieldSchema, snapshot: &Value) -> Vec<PlanOutcome> {
    schema
        .fields()
        .iter()
        .map(|field| {
            plan_element(
                target,
                "fields",
                field.identifier.as_str(),
                field.to_remote(),
                snapshot,
            )
        })
        .collect()
}

/// Keys of `kind` that are never planned as metadata
///
/// A task's scripts are read into its body and compared like any other key.
fn metadata_exclusions(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::DiagramTask => &[],
        other => other.detached_arrays(),
    }
}

/// Plans the owner's own top-level keys
///
/// One `replace` per differing key, one `add` per key missing remotely.
/// Server-managed keys and sub-element arrays are excluded. Keys present
/// only remotely are not removed.
pub fn plan_metadata(
    kind: EntityKind,
    target: &RemoteId,
    local: &Map<String, Value>,
    snapshot: &Value,
) -> Vec<SyncOperation> {
    let excluded = metadata_exclusions(kind);
    local
        .iter()
        .filter(|(key, _)| {
            !SERVER_MANAGED_FIELDS.contains(&key.as_str()) && !excluded.contains(&key.as_str())
        })
        .filter_map(|(key, value)| {
            let op = match snapshot.get(key) {
                Some(remote) if remote == value => return None,
                Some(_) => OperationKind::Replace,
                None => OperationKind::Add,
            };
            Some(SyncOperation {
                target_remote_id: target.clone(),
                op,
                path: PointerPath::Key(key.clone()),
                value: Some(value.clone()),
            })
        })
        .collect()
}

//! Kubernetes events describing what a sync pass did.
//!
//! Every event regards the `cluster` KubeStorageVersionMigrator. Publishing
//! is best effort: a failed publish is logged and the pass carries on.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::Resource;
use tracing::warn;

use crate::crd::{KubeStorageVersionMigrator, OPERATOR_CONFIG_NAME};
use crate::error::OperatorError;
use crate::resource::{ApplyAction, ApplyResult};

/// Reference to the singleton operator resource.
pub fn singleton_reference() -> ObjectReference {
    ObjectReference {
        api_version: Some(KubeStorageVersionMigrator::api_version(&()).to_string()),
        kind: Some(KubeStorageVersionMigrator::kind(&()).to_string()),
        name: Some(OPERATOR_CONFIG_NAME.to_string()),
        ..Default::default()
    }
}

/// Normal event for a write, `None` when nothing changed.
pub fn applied_event(kind: &str, name: &str, action: ApplyAction) -> Option<Event> {
    let (verb, action) = match action {
        ApplyAction::Created => ("Created", "Create"),
        ApplyAction::Updated => ("Updated", "Update"),
        ApplyAction::Unchanged => return None,
    };
    Some(Event {
        type_: EventType::Normal,
        reason: format!("{kind}{verb}"),
        note: Some(format!("{verb} {kind}/{name}")),
        action: action.to_string(),
        secondary: None,
    })
}

/// Warning event for a failed apply of `kind`.
pub fn apply_failed_event(kind: &str, name: &str, error: &OperatorError) -> Event {
    Event {
        type_: EventType::Warning,
        reason: format!("{kind}ApplyFailed"),
        note: Some(format!("Failed to apply {kind}/{name}: {error}")),
        action: "Apply".to_string(),
        secondary: None,
    }
}

/// The event for one static manifest outcome.
pub fn manifest_event(result: &ApplyResult) -> Option<Event> {
    match (&result.error, &result.name) {
        (Some(e), Some(name)) => Some(apply_failed_event(&result.kind, name, e)),
        (Some(e), None) => Some(Event {
            type_: EventType::Warning,
            reason: "ManifestLoadFailed".to_string(),
            note: Some(format!("Failed to load {}: {}", result.file, e)),
            action: "Apply".to_string(),
            secondary: None,
        }),
        (None, Some(name)) => applied_event(&result.kind, name, result.action),
        (None, None) => None,
    }
}

/// Warning event for a version mapping that could not be read.
pub fn version_mapping_failed_event(error: &OperatorError) -> Event {
    Event {
        type_: EventType::Warning,
        reason: "VersionMappingFailure".to_string(),
        note: Some(format!("Unable to get version mapping: {error}")),
        action: "Read".to_string(),
        secondary: None,
    }
}

/// Publish `event` regarding `reference`, logging failures.
pub async fn publish_event(recorder: &Recorder, reference: &ObjectReference, event: Event) {
    if let Err(e) = recorder.publish(&event, reference).await {
        warn!(%e, reason = %event.reason, "failed to publish event");
    }
}

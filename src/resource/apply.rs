//! Idempotent apply of static manifests and the operand Deployment.

use std::fmt::Debug;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::merge::merge_object_meta;
use super::read::{read_manifest, Manifest};
use crate::assets;
use crate::error::{OperatorError, Result};

/// Field manager used for every server-side apply
pub const FIELD_MANAGER: &str = "kube-storage-version-migrator-operator";

/// Hash of the required Deployment spec, used to detect template changes
pub const SPEC_HASH_ANNOTATION: &str = "operator.openshift.io/spec-hash";
/// Pod template annotation that forces a new rollout
pub const FORCE_ROLLOUT_ANNOTATION: &str = "operator.openshift.io/force-rollout";

/// What an apply did to the stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Updated,
    Unchanged,
}

impl ApplyAction {
    pub fn is_changed(&self) -> bool {
        !matches!(self, ApplyAction::Unchanged)
    }
}

/// Outcome of applying one embedded manifest
#[derive(Debug)]
pub struct ApplyResult {
    pub file: String,
    pub kind: String,
    /// Object name, absent when the manifest could not be loaded
    pub name: Option<String>,
    pub action: ApplyAction,
    pub error: Option<OperatorError>,
}

/// Apply every named asset, returning one result per file.
///
/// A failure on one file does not stop the remaining files from being applied.
pub async fn apply_directly(client: &Client, files: &[&str]) -> Vec<ApplyResult> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let manifest = match assets::asset(file).and_then(read_manifest) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(file = %file, error = %e, "Failed to load manifest");
                results.push(ApplyResult {
                    file: file.to_string(),
                    kind: "unknown".to_string(),
                    name: None,
                    action: ApplyAction::Unchanged,
                    error: Some(e),
                });
                continue;
            }
        };

        let kind = manifest.kind().to_string();
        let name = manifest.name().to_string();
        let outcome = apply_manifest(client, &manifest).await;
        match &outcome {
            Ok(ApplyAction::Unchanged) => debug!(file = %file, kind = %kind, "Manifest already up to date"),
            Ok(action) => info!(file = %file, kind = %kind, name = %name, ?action, "Applied manifest"),
            Err(e) => warn!(file = %file, kind = %kind, error = %e, "Failed to apply manifest"),
        }
        let (action, error) = match outcome {
            Ok(action) => (action, None),
            Err(e) => (ApplyAction::Unchanged, Some(e)),
        };
        results.push(ApplyResult {
            file: file.to_string(),
            kind,
            name: Some(name),
            action,
            error,
        });
    }
    results
}

async fn apply_manifest(client: &Client, manifest: &Manifest) -> Result<ApplyAction> {
    match manifest {
        Manifest::Namespace(obj) => server_side_apply(&Api::all(client.clone()), obj).await,
        Manifest::ClusterRole(obj) => server_side_apply(&Api::all(client.clone()), obj).await,
        Manifest::ClusterRoleBinding(obj) => server_side_apply(&Api::all(client.clone()), obj).await,
        Manifest::ServiceAccount(obj) => server_side_apply(&namespaced_api(client, obj)?, obj).await,
        Manifest::Role(obj) => server_side_apply(&namespaced_api(client, obj)?, obj).await,
        Manifest::RoleBinding(obj) => server_side_apply(&namespaced_api(client, obj)?, obj).await,
    }
}

fn namespaced_api<K>(client: &Client, obj: &K) -> Result<Api<K>>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    let namespace = obj.namespace().ok_or_else(|| {
        OperatorError::InvalidState(format!("{} has no namespace", obj.name_any()))
    })?;
    Ok(Api::namespaced(client.clone(), &namespace))
}

/// Server-side apply `obj`, reporting what happened to the stored object.
async fn server_side_apply<K>(api: &Api<K>, obj: &K) -> Result<ApplyAction>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.meta().name.clone().ok_or_else(|| {
        OperatorError::InvalidState(format!("{} manifest has no name", K::kind(&())))
    })?;
    let before = api
        .get_opt(&name)
        .await?
        .map(|existing| existing.meta().resource_version.clone());
    let applied = api
        .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(obj))
        .await?;
    Ok(match before {
        None => ApplyAction::Created,
        Some(version) if version != applied.meta().resource_version => ApplyAction::Updated,
        Some(_) => ApplyAction::Unchanged,
    })
}

/// Stamp the spec hash (and optionally the force-rollout marker) on `required`.
pub fn prepare_required_deployment(required: &mut Deployment, force_rollout: bool) -> Result<()> {
    let hash = spec_hash(required)?;
    required
        .annotations_mut()
        .insert(SPEC_HASH_ANNOTATION.to_string(), hash);

    if force_rollout {
        if let Some(spec) = required.spec.as_mut() {
            spec.template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(Default::default)
                .insert(FORCE_ROLLOUT_ANNOTATION.to_string(), Utc::now().to_rfc3339());
        }
    }
    Ok(())
}

fn spec_hash(deployment: &Deployment) -> Result<String> {
    let encoded = serde_json::to_vec(&deployment.spec)?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Decide what, if anything, must be written over `existing`.
///
/// Returns `None` when the live object already carries the required metadata,
/// its generation matches the one last recorded, and no rollout is forced.
pub fn plan_deployment_update(
    existing: &Deployment,
    required: &Deployment,
    expected_generation: i64,
    force_rollout: bool,
) -> Option<Deployment> {
    let mut merged = existing.clone();
    let modified = merge_object_meta(&mut merged.metadata, &required.metadata);

    if !modified && !force_rollout && existing.metadata.generation == Some(expected_generation) {
        return None;
    }

    merged.spec = required.spec.clone();
    Some(merged)
}

/// Create or update `required`, guarded by the generation last recorded for it.
///
/// Returns the live Deployment and what was written.
pub async fn apply_deployment(
    api: &Api<Deployment>,
    mut required: Deployment,
    expected_generation: i64,
    force_rollout: bool,
) -> Result<(Deployment, ApplyAction)> {
    prepare_required_deployment(&mut required, force_rollout)?;
    let name = required.name_any();

    let Some(existing) = api.get_opt(&name).await? else {
        let created = api.create(&PostParams::default(), &required).await?;
        info!(name = %name, "Created deployment");
        return Ok((created, ApplyAction::Created));
    };

    match plan_deployment_update(&existing, &required, expected_generation, force_rollout) {
        None => {
            debug!(name = %name, expected_generation, "Deployment up to date");
            Ok((existing, ApplyAction::Unchanged))
        }
        Some(to_write) => {
            let updated = api.replace(&name, &PostParams::default(), &to_write).await?;
            info!(
                name = %name,
                generation = ?updated.metadata.generation,
                "Updated deployment"
            );
            Ok((updated, ApplyAction::Updated))
        }
    }
}

//! Metadata merging and workload generation tracking.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::GenerationStatus;

const APPS_GROUP: &str = "apps";
const DEPLOYMENTS_RESOURCE: &str = "deployments";

/// Merge required labels, annotations and owner references into `existing`.
///
/// A required key ending in `-` removes the key without the suffix.
/// Returns whether `existing` was modified.
pub fn merge_object_meta(existing: &mut ObjectMeta, required: &ObjectMeta) -> bool {
    let mut modified = false;
    if let Some(labels) = &required.labels {
        modified |= merge_map(existing.labels.get_or_insert_with(BTreeMap::new), labels);
    }
    if let Some(annotations) = &required.annotations {
        modified |= merge_map(
            existing.annotations.get_or_insert_with(BTreeMap::new),
            annotations,
        );
    }
    if let Some(owners) = &required.owner_references {
        let current = existing.owner_references.get_or_insert_with(Vec::new);
        for owner in owners {
            match current.iter_mut().find(|o| o.uid == owner.uid) {
                Some(found) if found == owner => {}
                Some(found) => {
                    *found = owner.clone();
                    modified = true;
                }
                None => {
                    current.push(owner.clone());
                    modified = true;
                }
            }
        }
    }
    modified
}

fn merge_map(existing: &mut BTreeMap<String, String>, required: &BTreeMap<String, String>) -> bool {
    let mut modified = false;
    for (key, value) in required {
        if let Some(removed) = key.strip_suffix('-') {
            modified |= existing.remove(removed).is_some();
            continue;
        }
        if existing.get(key) != Some(value) {
            existing.insert(key.clone(), value.clone());
            modified = true;
        }
    }
    modified
}

/// Generation last recorded for `deployment`, or -1 when none is recorded.
pub fn expected_deployment_generation(deployment: &Deployment, generations: &[GenerationStatus]) -> i64 {
    let namespace = deployment.namespace().unwrap_or_default();
    let name = deployment.name_any();
    generations
        .iter()
        .find(|g| {
            g.group == APPS_GROUP
                && g.resource == DEPLOYMENTS_RESOURCE
                && g.namespace == namespace
                && g.name == name
        })
        .map(|g| g.last_generation)
        .unwrap_or(-1)
}

/// Record the current generation of `deployment`; `None` leaves the list untouched.
pub fn set_deployment_generation(generations: &mut Vec<GenerationStatus>, deployment: Option<&Deployment>) {
    let Some(deployment) = deployment else {
        return;
    };
    set_generation(
        generations,
        GenerationStatus {
            group: APPS_GROUP.to_string(),
            resource: DEPLOYMENTS_RESOURCE.to_string(),
            namespace: deployment.namespace().unwrap_or_default(),
            name: deployment.name_any(),
            last_generation: deployment.metadata.generation.unwrap_or_default(),
            hash: String::new(),
        },
    );
}

fn set_generation(generations: &mut Vec<GenerationStatus>, new: GenerationStatus) {
    match generations.iter_mut().find(|g| {
        g.group == new.group
            && g.resource == new.resource
            && g.namespace == new.namespace
            && g.name == new.name
    }) {
        Some(existing) => {
            existing.last_generation = new.last_generation;
            existing.hash = new.hash;
        }
        None => generations.push(new),
    }
}

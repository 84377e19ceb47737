//! The pure half of a sync pass: render the deployment, then derive status
//! from what the cluster reports back.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use kube::ResourceExt;
use storage_version_migrator_operator::conditions::{
    find_condition, CONDITION_AVAILABLE, CONDITION_PROGRESSING, CONDITION_TARGET_DEGRADED,
    CONDITION_FALSE, CONDITION_TRUE,
};
use storage_version_migrator_operator::config::DEFAULT_RESYNC;
use storage_version_migrator_operator::controllers::{
    build_deployment, collect_sync_errors, derive_status, needs_requeue,
};
use storage_version_migrator_operator::resource::apply::{plan_deployment_update, prepare_required_deployment};
use storage_version_migrator_operator::resource::{expected_deployment_generation, ApplyAction, ApplyResult};
use storage_version_migrator_operator::{
    KubeStorageVersionMigratorSpec, KubeStorageVersionMigratorStatus, OperatorConfig, OperatorError,
};

fn config() -> OperatorConfig {
    OperatorConfig::new("quay.io/migrator:v2", "quay.io/operator:v2", DEFAULT_RESYNC).unwrap()
}

/// What the API server would hand back after persisting `required`.
fn as_live(required: &Deployment, generation: i64, observed: i64, available: i32) -> Deployment {
    let mut live = required.clone();
    live.metadata.generation = Some(generation);
    live.metadata.resource_version = Some("100".to_string());
    live.status = Some(DeploymentStatus {
        observed_generation: Some(observed),
        available_replicas: Some(available),
        ..Default::default()
    });
    live
}

#[test]
fn rollout_settles_over_two_passes() {
    let spec = KubeStorageVersionMigratorSpec::default();
    let mut status = KubeStorageVersionMigratorStatus::default();

    // First pass: nothing recorded yet, rollout still in flight.
    let mut required = build_deployment(&spec, &config()).unwrap();
    assert_eq!(expected_deployment_generation(&required, &status.generations), -1);
    prepare_required_deployment(&mut required, false).unwrap();
    let live = as_live(&required, 1, 0, 0);

    derive_status(Some(&live), &[], &mut status, 1);
    let available = find_condition(&status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(available.status, CONDITION_FALSE);
    assert_eq!(available.reason.as_deref(), Some("NoMigratorPod"));
    assert_eq!(
        find_condition(&status.conditions, CONDITION_PROGRESSING).unwrap().status,
        CONDITION_TRUE
    );
    assert!(needs_requeue(&[], &status.conditions));

    // Second pass: generation recorded, pod available, nothing to write.
    let mut required = build_deployment(&spec, &config()).unwrap();
    let expected = expected_deployment_generation(&required, &status.generations);
    assert_eq!(expected, 1);
    prepare_required_deployment(&mut required, false).unwrap();
    let live = as_live(&required, 1, 1, 1);
    assert!(plan_deployment_update(&live, &required, expected, false).is_none());

    derive_status(Some(&live), &[], &mut status, 1);
    assert_eq!(
        find_condition(&status.conditions, CONDITION_AVAILABLE).unwrap().status,
        CONDITION_TRUE
    );
    assert_eq!(
        find_condition(&status.conditions, CONDITION_TARGET_DEGRADED).unwrap().status,
        CONDITION_FALSE
    );
    assert_eq!(status.ready_replicas, 1);
    assert!(!needs_requeue(&[], &status.conditions));
}

#[test]
fn image_change_triggers_update() {
    let spec = KubeStorageVersionMigratorSpec::default();
    let mut old = build_deployment(&spec, &config()).unwrap();
    prepare_required_deployment(&mut old, false).unwrap();
    let live = as_live(&old, 3, 3, 1);

    let upgraded = OperatorConfig::new("quay.io/migrator:v3", "quay.io/operator:v2", DEFAULT_RESYNC).unwrap();
    let mut required = build_deployment(&spec, &upgraded).unwrap();
    prepare_required_deployment(&mut required, false).unwrap();

    let to_write = plan_deployment_update(&live, &required, 3, false).unwrap();
    assert_eq!(
        to_write.annotations()["kubestorageversionmigrators.operator.openshift.io/pull-spec"],
        "quay.io/migrator:v3"
    );
    assert_eq!(to_write.metadata.resource_version.as_deref(), Some("100"));
}

#[test]
fn sync_errors_degrade_the_operator() {
    let mut status = KubeStorageVersionMigratorStatus::default();
    let results = vec![ApplyResult {
        file: "kube-storage-version-migrator/roles.yaml".to_string(),
        kind: "ClusterRoleBinding".to_string(),
        name: Some("storage-version-migration-migrator".to_string()),
        action: ApplyAction::Unchanged,
        error: Some(OperatorError::InvalidState("forbidden".to_string())),
    }];
    let errors = collect_sync_errors(&results, None);
    assert_eq!(
        errors,
        vec!["\"kube-storage-version-migrator/roles.yaml\" (ClusterRoleBinding): Invalid state: forbidden"]
    );
    derive_status(None, &errors, &mut status, 1);

    let degraded = find_condition(&status.conditions, CONDITION_TARGET_DEGRADED).unwrap();
    assert_eq!(degraded.status, CONDITION_TRUE);
    assert_eq!(degraded.reason.as_deref(), Some("SyncError"));
    assert!(degraded.message.as_deref().unwrap().ends_with("forbidden\n"));
    assert!(status.generations.is_empty());
    assert!(needs_requeue(&errors, &status.conditions));
}

//! Target Controller
//!
//! Reconciles the KubeStorageVersionMigrator resource: applies the static
//! operand manifests, reconciles the migrator Deployment, and reports
//! Available / Progressing / TargetDegraded conditions back onto the
//! resource status.

use crate::assets::{self, DEPLOYMENT_ASSET, STATIC_ASSETS};
use crate::conditions::{
    is_operator_condition_false, is_operator_condition_true, set_operator_condition,
    update_condition_fn, OperatorCondition, UpdateStatusFn, CONDITION_AVAILABLE, CONDITION_FALSE,
    CONDITION_PROGRESSING, CONDITION_TARGET_DEGRADED, CONDITION_TRUE,
};
use crate::config::{OperatorConfig, OPERAND_DEPLOYMENT, OPERAND_NAME, OPERAND_NAMESPACE};
use crate::controllers::backoff_delay;
use crate::crd::{
    KubeStorageVersionMigrator, KubeStorageVersionMigratorSpec, KubeStorageVersionMigratorStatus,
    OPERATOR_CONFIG_NAME,
};
use crate::error::{OperatorError, Result};
use crate::events::{
    applied_event, apply_failed_event, manifest_event, publish_event, singleton_reference,
    version_mapping_failed_event,
};
use crate::resource::{
    apply_deployment, apply_directly, expected_deployment_generation, read_deployment,
    set_deployment_generation, ApplyAction, ApplyResult,
};
use crate::status::update_status;
use crate::version::{version_for_operand, VersionRecorder};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller as KubeController};
use kube::runtime::events::{Recorder, Reporter};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PULL_SPEC_ANNOTATION: &str = "kubestorageversionmigrators.operator.openshift.io/pull-spec";
pub const OPERATOR_PULL_SPEC_ANNOTATION: &str =
    "kubestorageversionmigrators.operator.openshift.io/operator-pull-spec";

const IMAGE_PLACEHOLDER: &str = "${IMAGE}";
const OPERATOR_IMAGE_PLACEHOLDER: &str = "${OPERATOR_IMAGE}";

/// Delay before re-checking an operand that has not settled yet
const SETTLING_REQUEUE: Duration = Duration::from_secs(5);

/// Context for the target controller
pub struct TargetController {
    client: Client,
    config: OperatorConfig,
    versions: VersionRecorder,
    recorder: Recorder,
    failures: Mutex<HashMap<String, u32>>,
}

impl TargetController {
    /// Create a new target controller
    pub fn new(
        client: Client,
        config: OperatorConfig,
        versions: VersionRecorder,
        reporter: Reporter,
    ) -> Self {
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            config,
            versions,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Run the target controller
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let migrators: Api<KubeStorageVersionMigrator> = Api::all(self.client.clone());
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), OPERAND_NAMESPACE);

        info!("Starting KubeStorageVersionMigrator target controller");

        KubeController::new(migrators, Config::default())
            .watches(
                deployments,
                Config::default().fields(&format!("metadata.name={}", OPERAND_DEPLOYMENT)),
                |_deployment| Some(ObjectRef::new(OPERATOR_CONFIG_NAME)),
            )
            .shutdown_on_signal()
            .run(
                |migrator, ctx| async move { ctx.reconcile(migrator).await },
                |migrator, error, ctx| ctx.error_policy(&migrator, error),
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, action)) => {
                        debug!(name = %obj.name, ?action, "Reconciled kubestorageversionmigrator");
                    }
                    Err(e) => {
                        error!("Reconciliation failed: {:?}", e);
                    }
                }
            })
            .await;

        Ok(())
    }

    /// Reconcile a KubeStorageVersionMigrator
    async fn reconcile(
        &self,
        migrator: Arc<KubeStorageVersionMigrator>,
    ) -> std::result::Result<Action, OperatorError> {
        let name = migrator.name_any();
        if name != OPERATOR_CONFIG_NAME {
            debug!(name = %name, "Ignoring kubestorageversionmigrator that is not the singleton");
            return Ok(Action::await_change());
        }

        let management_state = migrator.spec.management_state;
        if !management_state.is_managed() {
            info!(name = %name, state = ?management_state, "Operand is not managed, skipping sync");
            return Ok(Action::requeue(self.config.resync_interval));
        }

        let generation = migrator.metadata.generation.unwrap_or_default();
        let status = migrator.status.clone().unwrap_or_default();

        info!(name = %name, generation, "Syncing kube-storage-version-migrator");
        let requeue = self.sync(&migrator.spec, &status, generation).await?;
        self.clear_failures(&name);

        if requeue {
            Ok(Action::requeue(SETTLING_REQUEUE))
        } else {
            Ok(Action::requeue(self.config.resync_interval))
        }
    }

    fn error_policy(&self, migrator: &KubeStorageVersionMigrator, error: &OperatorError) -> Action {
        let name = migrator.name_any();
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(name.clone()).or_insert(0);
        *count = count.saturating_add(1);
        let delay = backoff_delay(*count);
        warn!(name = %name, failures = *count, ?delay, "Reconciliation error: {}", error);
        Action::requeue(delay)
    }

    fn clear_failures(&self, name: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    /// One full reconcile pass. Returns whether another pass is needed soon.
    pub async fn sync(
        &self,
        spec: &KubeStorageVersionMigratorSpec,
        original_status: &KubeStorageVersionMigratorStatus,
        generation: i64,
    ) -> Result<bool> {
        let mut status = original_status.clone();
        let reference = singleton_reference();

        let results = apply_directly(&self.client, STATIC_ASSETS).await;
        for event in results.iter().filter_map(manifest_event) {
            publish_event(&self.recorder, &reference, event).await;
        }

        let deployment = match self.manage_deployment(spec, &status).await {
            Ok((deployment, action)) => {
                if let Some(event) = applied_event("Deployment", &deployment.name_any(), action) {
                    publish_event(&self.recorder, &reference, event).await;
                }
                Ok(deployment)
            }
            Err(e) => {
                let event = apply_failed_event("Deployment", OPERAND_DEPLOYMENT, &e);
                publish_event(&self.recorder, &reference, event).await;
                Err(e)
            }
        };
        let errors = collect_sync_errors(&results, deployment.as_ref().err());
        let deployment = deployment.ok();

        derive_status(deployment.as_ref(), &errors, &mut status, generation);

        if is_operator_condition_true(&status.conditions, CONDITION_AVAILABLE) {
            if let Some(image) = deployment.as_ref().and_then(operand_image) {
                let configmaps: Api<ConfigMap> =
                    Api::namespaced(self.client.clone(), OPERAND_NAMESPACE);
                match version_for_operand(&configmaps, &image).await {
                    Ok(Some(version)) => {
                        self.versions.set_version(OPERAND_NAME, &version).await;
                        status.version = Some(version);
                    }
                    Ok(None) => debug!(image = %image, "No version mapped for operand image"),
                    Err(e) => {
                        warn!(image = %image, error = %e, "Failed to resolve operand version");
                        publish_event(&self.recorder, &reference, version_mapping_failed_event(&e)).await;
                    }
                }
            }
        }

        let migrators: Api<KubeStorageVersionMigrator> = Api::all(self.client.clone());
        update_status(&migrators, OPERATOR_CONFIG_NAME, &status_mutators(&status)).await?;

        if !errors.is_empty() {
            warn!(errors = errors.len(), "Sync finished with errors");
        }
        Ok(needs_requeue(&errors, &status.conditions))
    }

    async fn manage_deployment(
        &self,
        spec: &KubeStorageVersionMigratorSpec,
        status: &KubeStorageVersionMigratorStatus,
    ) -> Result<(Deployment, ApplyAction)> {
        let deployment = build_deployment(spec, &self.config)?;
        let expected_generation = expected_deployment_generation(&deployment, &status.generations);
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), OPERAND_NAMESPACE);
        apply_deployment(&deployments, deployment, expected_generation, false).await
    }
}

/// One error line per failed manifest, in apply order, then the deployment failure.
pub fn collect_sync_errors(
    results: &[ApplyResult],
    deployment_error: Option<&OperatorError>,
) -> Vec<String> {
    let mut errors: Vec<String> = results
        .iter()
        .filter_map(|r| {
            r.error
                .as_ref()
                .map(|e| format!("{:?} ({}): {}", r.file, r.kind, e))
        })
        .collect();
    if let Some(e) = deployment_error {
        errors.push(format!("{:?}: {}", "deployments", e));
    }
    errors
}

/// Render the migrator Deployment from the embedded template.
pub fn build_deployment(
    spec: &KubeStorageVersionMigratorSpec,
    config: &OperatorConfig,
) -> Result<Deployment> {
    let mut deployment = read_deployment(assets::asset(DEPLOYMENT_ASSET)?)?;

    let template_spec = deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .ok_or_else(|| OperatorError::InvalidState("deployment template has no pod spec".to_string()))?;

    if let Some(init_containers) = template_spec.init_containers.take() {
        template_spec.init_containers = Some(resolve_image_references(init_containers, config)?);
    }
    template_spec.containers =
        resolve_image_references(std::mem::take(&mut template_spec.containers), config)?;

    let operand = template_spec
        .containers
        .first_mut()
        .ok_or_else(|| OperatorError::InvalidState("deployment template has no containers".to_string()))?;
    operand
        .args
        .get_or_insert_with(Vec::new)
        .push(format!("--v={}", spec.log_level.klog_verbosity()));

    let annotations = deployment.annotations_mut();
    annotations.insert(PULL_SPEC_ANNOTATION.to_string(), config.image_pull_spec.clone());
    annotations.insert(
        OPERATOR_PULL_SPEC_ANNOTATION.to_string(),
        config.operator_image_pull_spec.clone(),
    );

    Ok(deployment)
}

/// Substitute image placeholders; any other `$` in an image is an error.
pub fn resolve_image_references(
    containers: Vec<Container>,
    config: &OperatorConfig,
) -> Result<Vec<Container>> {
    containers
        .into_iter()
        .map(|mut container| {
            match container.image.as_deref() {
                Some(IMAGE_PLACEHOLDER) => container.image = Some(config.image_pull_spec.clone()),
                Some(OPERATOR_IMAGE_PLACEHOLDER) => {
                    container.image = Some(config.operator_image_pull_spec.clone())
                }
                Some(image) if image.contains('$') => {
                    return Err(OperatorError::InvalidImageReference(image.to_string()));
                }
                _ => {}
            }
            Ok(container)
        })
        .collect()
}

fn operand_image(deployment: &Deployment) -> Option<String> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone())
}

/// Derive every condition and bookkeeping field from one pass's outcome.
pub fn derive_status(
    deployment: Option<&Deployment>,
    errors: &[String],
    status: &mut KubeStorageVersionMigratorStatus,
    generation: i64,
) {
    manage_available(deployment, status);
    manage_progressing(deployment, status, generation);
    manage_degraded(errors, status);

    status.observed_generation = generation;
    set_deployment_generation(&mut status.generations, deployment);
    status.ready_replicas = deployment.map(available_replicas).unwrap_or_default();
}

fn available_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or_default()
}

fn deployment_ref() -> String {
    format!("deployment/{}.{}", OPERAND_DEPLOYMENT, OPERAND_NAMESPACE)
}

pub fn manage_available(deployment: Option<&Deployment>, status: &mut KubeStorageVersionMigratorStatus) {
    let condition = match deployment {
        None => OperatorCondition::new(CONDITION_AVAILABLE, CONDITION_FALSE)
            .with_reason("NoDeployment")
            .with_message(format!("{}: could not be retrieved", deployment_ref())),
        Some(d) if available_replicas(d) == 0 => OperatorCondition::new(CONDITION_AVAILABLE, CONDITION_FALSE)
            .with_reason("NoMigratorPod")
            .with_message(format!("{}: no replicas are available", deployment_ref())),
        Some(_) => OperatorCondition::new(CONDITION_AVAILABLE, CONDITION_TRUE).with_reason("AsExpected"),
    };
    set_operator_condition(&mut status.conditions, condition);
}

pub fn manage_progressing(
    deployment: Option<&Deployment>,
    status: &mut KubeStorageVersionMigratorStatus,
    generation: i64,
) {
    let mut messages = Vec::new();
    if let Some(d) = deployment {
        let desired = d.metadata.generation.unwrap_or_default();
        let observed = d
            .status
            .as_ref()
            .and_then(|s| s.observed_generation)
            .unwrap_or_default();
        if desired != observed {
            messages.push(format!(
                "{}: observed generation is {}, desired generation is {}.",
                deployment_ref(),
                observed,
                desired
            ));
        }
    }
    if generation != status.observed_generation {
        messages.push(format!(
            "kubestorageversionmigrators/{}: observed generation is {}, desired generation is {}.",
            OPERATOR_CONFIG_NAME, status.observed_generation, generation
        ));
    }

    let condition = if messages.is_empty() {
        OperatorCondition::new(CONDITION_PROGRESSING, CONDITION_FALSE)
    } else {
        OperatorCondition::new(CONDITION_PROGRESSING, CONDITION_TRUE)
            .with_reason("DesiredStateNotYetAchieved")
            .with_message(messages.join("\n"))
    };
    set_operator_condition(&mut status.conditions, condition);
}

pub fn manage_degraded(errors: &[String], status: &mut KubeStorageVersionMigratorStatus) {
    let condition = if errors.is_empty() {
        OperatorCondition::new(CONDITION_TARGET_DEGRADED, CONDITION_FALSE)
    } else {
        let message: String = errors.iter().map(|e| format!("{e}\n")).collect();
        OperatorCondition::new(CONDITION_TARGET_DEGRADED, CONDITION_TRUE)
            .with_reason("SyncError")
            .with_message(message)
    };
    set_operator_condition(&mut status.conditions, condition);
}

/// Mutators that carry this pass's results into the persisted status.
pub fn status_mutators(status: &KubeStorageVersionMigratorStatus) -> Vec<UpdateStatusFn> {
    let mut mutators: Vec<UpdateStatusFn> = status
        .conditions
        .iter()
        .cloned()
        .map(update_condition_fn)
        .collect();

    let observed_generation = status.observed_generation;
    let generations = status.generations.clone();
    let ready_replicas = status.ready_replicas;
    let version = status.version.clone();
    mutators.push(Box::new(move |persisted: &mut KubeStorageVersionMigratorStatus| {
        persisted.observed_generation = observed_generation;
        persisted.generations = generations.clone();
        persisted.ready_replicas = ready_replicas;
        if version.is_some() {
            persisted.version = version.clone();
        }
        Ok(())
    }));
    mutators
}

/// Whether the operand has not settled yet.
pub fn needs_requeue(errors: &[String], conditions: &[OperatorCondition]) -> bool {
    !errors.is_empty()
        || !is_operator_condition_false(conditions, CONDITION_TARGET_DEGRADED)
        || !is_operator_condition_false(conditions, CONDITION_PROGRESSING)
        || !is_operator_condition_true(conditions, CONDITION_AVAILABLE)
}

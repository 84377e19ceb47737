//! KubeStorageVersionMigrator Custom Resource Definition
//!
//! Cluster-scoped operator configuration for the storage version migrator.
//! The operator only acts on the singleton named `cluster`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::OperatorCondition;

/// Name of the singleton resource the operator reconciles
pub const OPERATOR_CONFIG_NAME: &str = "cluster";

/// KubeStorageVersionMigrator is the Schema for the kubestorageversionmigrators API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "operator.openshift.io",
    version = "v1",
    kind = "KubeStorageVersionMigrator",
    plural = "kubestorageversionmigrators",
    status = "KubeStorageVersionMigratorStatus",
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KubeStorageVersionMigratorSpec {
    /// Whether and how the operator manages the operand
    #[serde(default)]
    pub management_state: ManagementState,

    /// Log verbosity of the migrator operand
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log verbosity of the operator itself. Accepted for API compatibility
    /// only: the operator's own filter comes from `RUST_LOG`.
    #[serde(default)]
    pub operator_log_level: LogLevel,

    /// Opaque overrides, accepted but not interpreted
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub unsupported_config_overrides: Option<serde_json::Value>,
}

/// Management state of the operand
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
    Removed,
    Force,
}

impl ManagementState {
    /// Whether a reconcile pass should touch the cluster at all
    pub fn is_managed(&self) -> bool {
        matches!(self, ManagementState::Managed | ManagementState::Force)
    }
}

/// Log level of an operand or operator.
///
/// The empty string is accepted and treated as `Normal`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[default]
    #[serde(alias = "")]
    Normal,
    Debug,
    Trace,
    TraceAll,
}

impl LogLevel {
    /// klog `-v` verbosity for this level
    pub fn klog_verbosity(&self) -> u8 {
        match self {
            LogLevel::Normal => 2,
            LogLevel::Debug => 4,
            LogLevel::Trace => 6,
            LogLevel::TraceAll => 8,
        }
    }
}

/// Status of the KubeStorageVersionMigrator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeStorageVersionMigratorStatus {
    /// Generation of the spec last acted upon
    #[serde(default)]
    pub observed_generation: i64,
    /// Conditions representing operator state
    #[serde(default)]
    pub conditions: Vec<OperatorCondition>,
    /// Generations of the workloads the operator applied
    #[serde(default)]
    pub generations: Vec<GenerationStatus>,
    /// Available replicas of the migrator deployment
    #[serde(default)]
    pub ready_replicas: i32,
    /// Version of the running operand
    #[serde(default)]
    pub version: Option<String>,
}

/// Last applied generation of a managed workload
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    pub group: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
    pub last_generation: i64,
    #[serde(default)]
    pub hash: String,
}

fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert("nullable".to_string(), serde_json::json!(true));
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::json!(true),
    );
    schema.into()
}

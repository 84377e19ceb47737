//! Decoding of embedded manifests into typed Kubernetes objects.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::ResourceExt;
use serde::de::DeserializeOwned;

use crate::error::{OperatorError, Result};

/// A static manifest the direct applier knows how to apply
#[derive(Debug, Clone)]
pub enum Manifest {
    Namespace(Namespace),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Role(Role),
    RoleBinding(RoleBinding),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::Namespace(_) => "Namespace",
            Manifest::ServiceAccount(_) => "ServiceAccount",
            Manifest::ClusterRole(_) => "ClusterRole",
            Manifest::ClusterRoleBinding(_) => "ClusterRoleBinding",
            Manifest::Role(_) => "Role",
            Manifest::RoleBinding(_) => "RoleBinding",
        }
    }

    pub fn name(&self) -> String {
        match self {
            Manifest::Namespace(o) => o.name_any(),
            Manifest::ServiceAccount(o) => o.name_any(),
            Manifest::ClusterRole(o) => o.name_any(),
            Manifest::ClusterRoleBinding(o) => o.name_any(),
            Manifest::Role(o) => o.name_any(),
            Manifest::RoleBinding(o) => o.name_any(),
        }
    }
}

/// Parse a single-document manifest of one of the supported static kinds.
pub fn read_manifest(yaml: &str) -> Result<Manifest> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let kind = manifest_kind(&value)?;

    match kind.as_str() {
        "Namespace" => Ok(Manifest::Namespace(decode(value)?)),
        "ServiceAccount" => Ok(Manifest::ServiceAccount(decode(value)?)),
        "ClusterRole" => Ok(Manifest::ClusterRole(decode(value)?)),
        "ClusterRoleBinding" => Ok(Manifest::ClusterRoleBinding(decode(value)?)),
        "Role" => Ok(Manifest::Role(decode(value)?)),
        "RoleBinding" => Ok(Manifest::RoleBinding(decode(value)?)),
        _ => Err(OperatorError::UnsupportedKind(kind)),
    }
}

/// Parse a Deployment manifest.
pub fn read_deployment(yaml: &str) -> Result<Deployment> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let kind = manifest_kind(&value)?;
    if kind != "Deployment" {
        return Err(OperatorError::UnsupportedKind(kind));
    }
    decode(value)
}

fn manifest_kind(value: &serde_yaml::Value) -> Result<String> {
    value
        .get("kind")
        .and_then(|kind| kind.as_str())
        .map(str::to_string)
        .ok_or_else(|| OperatorError::InvalidState("manifest has no kind".to_string()))
}

fn decode<K: DeserializeOwned>(value: serde_yaml::Value) -> Result<K> {
    Ok(serde_yaml::from_value(value)?)
}

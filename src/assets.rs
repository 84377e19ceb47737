//! Manifests embedded into the operator binary.

use crate::error::{OperatorError, Result};

pub const NAMESPACE_ASSET: &str = "kube-storage-version-migrator/namespace.yaml";
pub const SERVICE_ACCOUNT_ASSET: &str = "kube-storage-version-migrator/serviceaccount.yaml";
pub const ROLES_ASSET: &str = "kube-storage-version-migrator/roles.yaml";
pub const DEPLOYMENT_ASSET: &str = "kube-storage-version-migrator/deployment.yaml";

/// Static manifests applied before the deployment, in apply order
pub const STATIC_ASSETS: &[&str] = &[NAMESPACE_ASSET, SERVICE_ACCOUNT_ASSET, ROLES_ASSET];

const EMBEDDED: &[(&str, &str)] = &[
    (
        NAMESPACE_ASSET,
        include_str!("../assets/kube-storage-version-migrator/namespace.yaml"),
    ),
    (
        SERVICE_ACCOUNT_ASSET,
        include_str!("../assets/kube-storage-version-migrator/serviceaccount.yaml"),
    ),
    (
        ROLES_ASSET,
        include_str!("../assets/kube-storage-version-migrator/roles.yaml"),
    ),
    (
        DEPLOYMENT_ASSET,
        include_str!("../assets/kube-storage-version-migrator/deployment.yaml"),
    ),
];

/// Returns the embedded manifest registered under `name`.
pub fn asset(name: &str) -> Result<&'static str> {
    EMBEDDED
        .iter()
        .find(|(asset_name, _)| *asset_name == name)
        .map(|(_, content)| *content)
        .ok_or_else(|| OperatorError::NotFound(format!("asset {name}")))
}

pub fn asset_names() -> impl Iterator<Item = &'static str> {
    EMBEDDED.iter().map(|(name, _)| *name)
}

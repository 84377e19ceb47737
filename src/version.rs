//! Operand version tracking.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;

/// ConfigMap in the operand namespace mapping image pull specs to versions
pub const VERSION_MAPPING_CONFIGMAP: &str = "version-mapping";

/// Thread-safe record of the versions of the operator and its operands.
#[derive(Debug, Clone, Default)]
pub struct VersionRecorder {
    versions: Arc<RwLock<BTreeMap<String, String>>>,
}

impl VersionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `version` for `operand`, logging only when it changes.
    pub async fn set_version(&self, operand: &str, version: &str) {
        let mut versions = self.versions.write().await;
        let previous = versions.insert(operand.to_string(), version.to_string());
        if previous.as_deref() != Some(version) {
            info!(operand = %operand, version = %version, "Recorded operand version");
        }
    }

    pub async fn get_version(&self, operand: &str) -> Option<String> {
        self.versions.read().await.get(operand).cloned()
    }

    pub async fn versions(&self) -> BTreeMap<String, String> {
        self.versions.read().await.clone()
    }
}

/// Resolve the version of the operand running `image`.
///
/// Unknown images and a missing mapping ConfigMap both resolve to `None`.
pub async fn version_for_operand(configmaps: &Api<ConfigMap>, image: &str) -> Result<Option<String>> {
    match configmaps.get_opt(VERSION_MAPPING_CONFIGMAP).await? {
        Some(mapping) => Ok(lookup_version(&mapping, image)),
        None => {
            debug!("No {} ConfigMap, operand version unknown", VERSION_MAPPING_CONFIGMAP);
            Ok(None)
        }
    }
}

fn lookup_version(mapping: &ConfigMap, image: &str) -> Option<String> {
    mapping
        .data
        .as_ref()
        .and_then(|data| data.get(image))
        .filter(|version| !version.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get_version() {
        let recorder = VersionRecorder::new();
        assert!(recorder.get_version("migrator").await.is_none());

        recorder.set_version("migrator", "4.15.0").await;
        recorder.set_version("operator", "0.1.0").await;
        assert_eq!(recorder.get_version("migrator").await.as_deref(), Some("4.15.0"));
        assert_eq!(recorder.versions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let recorder = VersionRecorder::new();
        let clone = recorder.clone();
        clone.set_version("migrator", "1.0").await;
        assert_eq!(recorder.get_version("migrator").await.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_lookup_version() {
        let mapping = ConfigMap {
            data: Some(BTreeMap::from([(
                "quay.io/migrator:v1".to_string(),
                "4.15.0".to_string(),
            )])),
            ..Default::default()
        };
        assert_eq!(lookup_version(&mapping, "quay.io/migrator:v1").as_deref(), Some("4.15.0"));
        assert!(lookup_version(&mapping, "quay.io/other:v1").is_none());
        assert!(lookup_version(&ConfigMap::default(), "quay.io/migrator:v1").is_none());
    }

    #[test]
    fn test_empty_mapping_entry_is_unknown() {
        let mapping = ConfigMap {
            data: Some(BTreeMap::from([("quay.io/migrator:v1".to_string(), String::new())])),
            ..Default::default()
        };
        assert!(lookup_version(&mapping, "quay.io/migrator:v1").is_none());
    }
}

//! Runtime configuration of the operator.

use std::time::Duration;

use crate::error::{OperatorError, Result};

/// Namespace the operand workload runs in
pub const OPERAND_NAMESPACE: &str = "openshift-kube-storage-version-migrator";
/// Name of the operand deployment
pub const OPERAND_DEPLOYMENT: &str = "migrator";
/// Operand name used for version reporting
pub const OPERAND_NAME: &str = "kube-storage-version-migrator";

pub const DEFAULT_RESYNC: Duration = Duration::from_secs(300);

/// Validated settings shared by the controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Pull spec substituted for `${IMAGE}`
    pub image_pull_spec: String,
    /// Pull spec substituted for `${OPERATOR_IMAGE}`
    pub operator_image_pull_spec: String,
    /// Interval between reconcile passes once the operand is settled
    pub resync_interval: Duration,
}

impl OperatorConfig {
    pub fn new(
        image_pull_spec: impl Into<String>,
        operator_image_pull_spec: impl Into<String>,
        resync_interval: Duration,
    ) -> Result<Self> {
        let config = Self {
            image_pull_spec: image_pull_spec.into(),
            operator_image_pull_spec: operator_image_pull_spec.into(),
            resync_interval,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_pull_spec("image", &self.image_pull_spec)?;
        validate_pull_spec("operator image", &self.operator_image_pull_spec)?;
        if self.resync_interval.is_zero() {
            return Err(OperatorError::Configuration(
                "resync interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_pull_spec(what: &str, pull_spec: &str) -> Result<()> {
    if pull_spec.trim().is_empty() {
        return Err(OperatorError::Configuration(format!("{what} pull spec is empty")));
    }
    if pull_spec.contains('$') {
        return Err(OperatorError::Configuration(format!(
            "{what} pull spec {pull_spec:?} contains an unresolved placeholder"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = OperatorConfig::new("quay.io/migrator:v1", "quay.io/operator:v1", DEFAULT_RESYNC)
            .unwrap();
        assert_eq!(config.image_pull_spec, "quay.io/migrator:v1");
        assert_eq!(config.resync_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_empty_pull_spec_rejected() {
        let err = OperatorConfig::new("", "quay.io/operator:v1", DEFAULT_RESYNC).unwrap_err();
        assert!(err.to_string().contains("image pull spec is empty"));
    }

    #[test]
    fn test_placeholder_pull_spec_rejected() {
        let err = OperatorConfig::new("quay.io/migrator:v1", "${OPERATOR_IMAGE}", DEFAULT_RESYNC)
            .unwrap_err();
        assert!(matches!(err, OperatorError::Configuration(_)));
    }

    #[test]
    fn test_zero_resync_rejected() {
        assert!(OperatorConfig::new("a", "b", Duration::ZERO).is_err());
    }
}

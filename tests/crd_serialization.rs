use kube::CustomResourceExt;
use serde_json::json;
use storage_version_migrator_operator::{
    KubeStorageVersionMigrator, KubeStorageVersionMigratorSpec, LogLevel, ManagementState,
};

#[test]
fn spec_serializes_camel_case() {
    let spec = KubeStorageVersionMigratorSpec {
        management_state: ManagementState::Managed,
        log_level: LogLevel::TraceAll,
        operator_log_level: LogLevel::Debug,
        unsupported_config_overrides: None,
    };
    let j = serde_json::to_value(&spec).unwrap();
    assert_eq!(
        j,
        json!({
            "managementState": "Managed",
            "logLevel": "TraceAll",
            "operatorLogLevel": "Debug",
            "unsupportedConfigOverrides": null
        })
    );
}

#[test]
fn crd_is_cluster_scoped() {
    let crd = KubeStorageVersionMigrator::crd();
    assert_eq!(crd.spec.group, "operator.openshift.io");
    assert_eq!(crd.spec.scope, "Cluster");
    assert_eq!(crd.spec.names.plural, "kubestorageversionmigrators");
    assert_eq!(crd.spec.versions[0].name, "v1");
}

#[test]
fn resource_parses_from_yaml() {
    let yaml = r#"
apiVersion: operator.openshift.io/v1
kind: KubeStorageVersionMigrator
metadata:
  name: cluster
  generation: 2
spec:
  managementState: Unmanaged
  logLevel: Trace
status:
  observedGeneration: 1
  conditions:
    - type: Available
      status: "True"
      reason: AsExpected
"#;
    let obj: KubeStorageVersionMigrator = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(obj.spec.management_state, ManagementState::Unmanaged);
    assert_eq!(obj.spec.log_level.klog_verbosity(), 6);
    let status = obj.status.unwrap();
    assert_eq!(status.observed_generation, 1);
    assert_eq!(status.conditions[0].reason.as_deref(), Some("AsExpected"));
}

//! Kube Storage Version Migrator Operator
//!
//! A Kubernetes operator that deploys the storage version migrator and
//! reports its health through the `KubeStorageVersionMigrator` resource.
//!
//! ## Custom Resources
//!
//! - `KubeStorageVersionMigrator`: cluster-scoped singleton named `cluster`
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: operator.openshift.io/v1
//! kind: KubeStorageVersionMigrator
//! metadata:
//!   name: cluster
//! spec:
//!   managementState: Managed
//!   logLevel: Debug
//! ```

pub mod assets;
pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod leader_election;
pub mod resource;
pub mod status;
pub mod version;

pub use config::OperatorConfig;
pub use controllers::TargetController;
pub use crd::{
    GenerationStatus, KubeStorageVersionMigrator, KubeStorageVersionMigratorSpec,
    KubeStorageVersionMigratorStatus, LogLevel, ManagementState,
};
pub use error::{OperatorError, Result};
pub use version::VersionRecorder;

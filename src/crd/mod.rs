//! Custom Resource Definitions for the storage version migrator operator
//!
//! - KubeStorageVersionMigrator: cluster-scoped operator configuration and status

mod migrator;

pub use migrator::{
    GenerationStatus, KubeStorageVersionMigrator, KubeStorageVersionMigratorSpec,
    KubeStorageVersionMigratorStatus, LogLevel, ManagementState, OPERATOR_CONFIG_NAME,
};

//! Controllers for the storage version migrator operator
//!
//! The target controller watches the KubeStorageVersionMigrator singleton and
//! the operand Deployment, and reconciles the operand towards the embedded
//! manifests.

mod target;

pub use target::{
    build_deployment, collect_sync_errors, derive_status, manage_available, manage_degraded, manage_progressing,
    needs_requeue, resolve_image_references, status_mutators, TargetController,
    OPERATOR_PULL_SPEC_ANNOTATION, PULL_SPEC_ANNOTATION,
};

use std::time::Duration;

const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Requeue delay after `failures` consecutive reconcile errors.
///
/// Doubles from 5s per failure and is capped at 5 minutes.
pub fn backoff_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    BACKOFF_BASE
        .checked_mul(1u32 << exponent)
        .map_or(BACKOFF_MAX, |delay| delay.min(BACKOFF_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(10));
        assert_eq!(backoff_delay(3), Duration::from_secs(20));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(7), Duration::from_secs(300));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_zero_failures() {
        assert_eq!(backoff_delay(0), Duration::from_secs(5));
    }
}

//! Optimistic status writer for the operator resource.
//!
//! The status is re-read before every attempt and written back with the
//! resourceVersion it was read at, so concurrent writers never clobber each
//! other; a stale write is retried against the fresh object.

use kube::api::{Api, PostParams};
use tracing::{debug, warn};

use crate::conditions::UpdateStatusFn;
use crate::crd::{KubeStorageVersionMigrator, KubeStorageVersionMigratorStatus};
use crate::error::{OperatorError, Result};

const MAX_CONFLICT_RETRIES: usize = 5;

/// Apply `mutators` in order to a copy of `status`.
pub fn apply_mutators(
    status: &KubeStorageVersionMigratorStatus,
    mutators: &[UpdateStatusFn],
) -> Result<KubeStorageVersionMigratorStatus> {
    let mut updated = status.clone();
    for mutate in mutators {
        mutate(&mut updated)?;
    }
    Ok(updated)
}

/// Merge `mutators` into the persisted status of `name`.
///
/// Returns the resulting status and whether a write was needed.
pub async fn update_status(
    api: &Api<KubeStorageVersionMigrator>,
    name: &str,
    mutators: &[UpdateStatusFn],
) -> Result<(KubeStorageVersionMigratorStatus, bool)> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = api.get(name).await?;
        let old_status = current.status.clone().unwrap_or_default();
        let new_status = apply_mutators(&old_status, mutators)?;
        if new_status == old_status {
            debug!(name = %name, "Status unchanged, skipping write");
            return Ok((old_status, false));
        }

        let mut updated = current;
        updated.status = Some(new_status.clone());
        let body = serde_json::to_vec(&updated)?;

        match api.replace_status(name, &PostParams::default(), body).await {
            Ok(written) => return Ok((written.status.unwrap_or(new_status), true)),
            Err(e) => {
                let err = OperatorError::from(e);
                if err.is_conflict() && attempt < MAX_CONFLICT_RETRIES {
                    warn!(name = %name, attempt, "Status update conflict, retrying");
                    continue;
                }
                return Err(err);
            }
        }
    }
}

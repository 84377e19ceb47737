//! Lease-based leader election.
//!
//! Only the holder of the `coordination.k8s.io/v1` Lease runs the target
//! controller. Standby replicas block in [`LeaderElector::acquire`] until the
//! holder releases the lease or stops renewing it.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{OperatorError, Result};

pub const LEASE_NAME: &str = "kube-storage-version-migrator-operator-lock";
const LEASE_DURATION_SECS: i32 = 137;
const RENEW_INTERVAL: Duration = Duration::from_secs(26);
const RETRY_INTERVAL: Duration = Duration::from_secs(26);

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const DEFAULT_OPERATOR_NAMESPACE: &str = "openshift-kube-storage-version-migrator-operator";

/// Namespace holding the lease: explicit value, then the pod's own namespace.
pub fn detect_namespace(explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| DEFAULT_OPERATOR_NAMESPACE.to_string())
}

/// Elects a single active operator replica through a Lease.
pub struct LeaderElector {
    lease_api: Api<Lease>,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str) -> Self {
        let lease_api = Api::<Lease>::namespaced(client, namespace);
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("operator-{:08x}", rand::random::<u32>()));
        info!(identity = %identity, namespace = %namespace, "Initialized leader elector");
        Self { lease_api, identity }
    }

    /// Blocks until the lease is held by this replica.
    pub async fn acquire(&self) -> Result<()> {
        info!(identity = %self.identity, lease = LEASE_NAME, "Waiting to acquire leader lease");
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Acquired leader lease");
                    return Ok(());
                }
                Ok(false) => debug!(?RETRY_INTERVAL, "Lease held by another replica"),
                Err(e) => warn!(error = %e, ?RETRY_INTERVAL, "Lease acquisition error"),
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Renews the lease. Returns `Ok(false)` once leadership is lost.
    pub async fn renew(&self) -> Result<bool> {
        let lease = self.lease_api.get(LEASE_NAME).await?;
        if holder(&lease) != Some(self.identity.as_str()) {
            return Ok(false);
        }

        let mut updated = lease;
        if let Some(spec) = updated.spec.as_mut() {
            spec.renew_time = Some(MicroTime(Utc::now()));
        }
        match self.replace(&updated).await {
            Ok(()) => {
                debug!("Renewed leader lease");
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                warn!("Lease conflict during renewal, lost leadership");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Clears the holder identity so a standby replica can take over at once.
    pub async fn release(&self) {
        let lease = match self.lease_api.get(LEASE_NAME).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "Failed to read lease for release");
                return;
            }
        };
        if holder(&lease) != Some(self.identity.as_str()) {
            debug!("Lease not held by this replica, skipping release");
            return;
        }

        let mut updated = lease;
        if let Some(spec) = updated.spec.as_mut() {
            spec.holder_identity = None;
        }
        match self.replace(&updated).await {
            Ok(()) => info!("Released leader lease"),
            Err(e) => warn!(error = %e, "Failed to release leader lease"),
        }
    }

    pub fn renew_interval(&self) -> Duration {
        RENEW_INTERVAL
    }

    async fn try_acquire(&self) -> Result<bool> {
        let now = Utc::now();
        let existing = match self.lease_api.get_opt(LEASE_NAME).await? {
            Some(existing) => existing,
            None => return self.create_lease(now).await,
        };

        let spec = existing.spec.as_ref();
        if holder(&existing) == Some(self.identity.as_str()) {
            self.take_lease(&existing, now, false).await
        } else if is_expired(spec, now) {
            self.take_lease(&existing, now, true).await
        } else {
            Ok(false)
        }
    }

    async fn create_lease(&self, now: DateTime<Utc>) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(LEASE_DURATION_SECS),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(0),
                ..Default::default()
            }),
        };
        match self.lease_api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let e = OperatorError::from(e);
                if e.is_conflict() {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn take_lease(&self, existing: &Lease, now: DateTime<Utc>, takeover: bool) -> Result<bool> {
        let mut updated = existing.clone();
        updated.spec = Some(next_spec(existing.spec.as_ref(), &self.identity, now, takeover));
        match self.replace(&updated).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn replace(&self, lease: &Lease) -> Result<()> {
        self.lease_api
            .replace(LEASE_NAME, &PostParams::default(), lease)
            .await?;
        Ok(())
    }
}

fn holder(lease: &Lease) -> Option<&str> {
    lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref())
}

/// A lease without a holder or renew time, or not renewed within its duration, is free.
fn is_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let Some(spec) = spec else {
        return true;
    };
    if spec.holder_identity.is_none() {
        return true;
    }
    let duration_secs = i64::from(spec.lease_duration_seconds.unwrap_or(LEASE_DURATION_SECS));
    match &spec.renew_time {
        Some(MicroTime(renewed)) => now.signed_duration_since(*renewed).num_seconds() > duration_secs,
        None => true,
    }
}

fn next_spec(previous: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>, takeover: bool) -> LeaseSpec {
    let transitions = previous.and_then(|s| s.lease_transitions).unwrap_or(0);
    LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(LEASE_DURATION_SECS),
        acquire_time: if takeover {
            Some(MicroTime(now))
        } else {
            previous.and_then(|s| s.acquire_time.clone())
        },
        renew_time: Some(MicroTime(now)),
        lease_transitions: Some(if takeover { transitions + 1 } else { transitions }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_spec(renewed: DateTime<Utc>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some("other".to_string()),
            lease_duration_seconds: Some(15),
            renew_time: Some(MicroTime(renewed)),
            lease_transitions: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_namespace_explicit() {
        assert_eq!(detect_namespace("custom"), "custom");
    }

    #[test]
    fn test_fresh_lease_not_expired() {
        let now = Utc::now();
        assert!(!is_expired(Some(&held_spec(now)), now));
    }

    #[test]
    fn test_stale_lease_expired() {
        let now = Utc::now();
        let renewed = now - chrono::Duration::seconds(30);
        assert!(is_expired(Some(&held_spec(renewed)), now));
    }

    #[test]
    fn test_released_lease_expired() {
        let now = Utc::now();
        let mut spec = held_spec(now);
        spec.holder_identity = None;
        assert!(is_expired(Some(&spec), now));
        assert!(is_expired(None, now));
    }

    #[test]
    fn test_takeover_bumps_transitions() {
        let now = Utc::now();
        let previous = held_spec(now);
        let next = next_spec(Some(&previous), "me", now, true);
        assert_eq!(next.holder_identity.as_deref(), Some("me"));
        assert_eq!(next.lease_transitions, Some(3));
        assert!(next.acquire_time.is_some());

        let renewed = next_spec(Some(&previous), "me", now, false);
        assert_eq!(renewed.lease_transitions, Some(2));
        assert!(renewed.acquire_time.is_none());
    }
}

//! Binding Resolver
//!
//! Resolves a claim to the volume it is bound to, waiting for the binding
//! when the claim is still pending.

use super::config::BindPolicy;
use crate::domain::ports::{ClusterReaderRef, ResolveContext};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// Claim Phase
// =============================================================================

/// Binding status of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPhase {
    Pending,
    Bound,
    Lost,
    Unknown,
}

impl ClaimPhase {
    pub fn of(claim: &PersistentVolumeClaim) -> Self {
        match claim.status.as_ref().and_then(|s| s.phase.as_deref()) {
            Some("Pending") => ClaimPhase::Pending,
            Some("Bound") => ClaimPhase::Bound,
            Some("Lost") => ClaimPhase::Lost,
            _ => ClaimPhase::Unknown,
        }
    }
}

impl std::fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimPhase::Pending => write!(f, "Pending"),
            ClaimPhase::Bound => write!(f, "Bound"),
            ClaimPhase::Lost => write!(f, "Lost"),
            ClaimPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Volume name of a claim that is bound, `None` otherwise
fn bound_volume_name(claim: &PersistentVolumeClaim) -> Option<&str> {
    if ClaimPhase::of(claim) != ClaimPhase::Bound {
        return None;
    }
    claim
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Binding Resolver
// =============================================================================

/// Volume a claim is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundVolume {
    pub volume_name: String,
    /// Claim observations it took, starting at 1
    pub attempts: u32,
}

/// Resolves claims to their bound volumes
pub struct BindingResolver {
    reader: ClusterReaderRef,
    policy: BindPolicy,
}

impl BindingResolver {
    pub fn new(reader: ClusterReaderRef, policy: BindPolicy) -> Self {
        Self { reader, policy }
    }

    pub fn policy(&self) -> &BindPolicy {
        &self.policy
    }

    /// Find a claim by exact (name, namespace) among the namespace's claims
    pub async fn get_claim(&self, name: &str, namespace: &str) -> Result<PersistentVolumeClaim> {
        let claims = self.reader.list_claims(namespace).await?;

        let mut matches = claims.into_iter().filter(|c| {
            c.metadata.name.as_deref() == Some(name)
                && c.metadata.namespace.as_deref() == Some(namespace)
        });

        let claim = matches.next().ok_or_else(|| Error::ClaimNotFound {
            claim: name.to_string(),
            namespace: namespace.to_string(),
        })?;

        let extra = matches.count();
        if extra > 0 {
            warn!(
                "Claim {}/{} listed {} extra times, using the first",
                namespace, name, extra
            );
        }

        debug!("Found claim {}/{}", namespace, name);
        Ok(claim)
    }

    /// Resolve the volume a claim is bound to
    ///
    /// Re-observes an unbound claim up to `max_attempts` times, sleeping
    /// `retry_interval` between observations. The wait ends early with
    /// [`Error::Cancelled`] when the context is cancelled, or with
    /// [`Error::BindTimeout`] when the next observation would fall past the
    /// deadline. A missing claim or an API error ends it immediately.
    pub async fn resolve_bound_volume(
        &self,
        ctx: &ResolveContext,
        claim_name: &str,
        namespace: &str,
    ) -> Result<BoundVolume> {
        let max_attempts = self.policy.max_attempts.max(1);
        let interval = self.policy.retry_interval();
        let deadline = self.policy.deadline().map(|d| Instant::now() + d);

        let timeout = |attempts| Error::BindTimeout {
            claim: claim_name.to_string(),
            namespace: namespace.to_string(),
            attempts,
        };

        for attempt in 1..=max_attempts {
            let claim = self.get_claim(claim_name, namespace).await?;

            if let Some(volume_name) = bound_volume_name(&claim) {
                info!(
                    "Found bound volume {} for claim {} after {} attempt(s)",
                    volume_name, claim_name, attempt
                );
                return Ok(BoundVolume {
                    volume_name: volume_name.to_string(),
                    attempts: attempt,
                });
            }

            if attempt == max_attempts {
                break;
            }

            let wake = Instant::now() + interval;
            if deadline.map(|d| wake > d).unwrap_or(false) {
                warn!(
                    "Claim {} still {} and the bind deadline is reached",
                    claim_name,
                    ClaimPhase::of(&claim)
                );
                return Err(timeout(attempt));
            }

            warn!(
                "Claim {} is {}, waiting {} seconds before retry ({}/{})",
                claim_name,
                ClaimPhase::of(&claim),
                interval.as_secs(),
                attempt,
                max_attempts
            );

            tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {
                    warn!("Bind wait for claim {} cancelled", claim_name);
                    return Err(Error::Cancelled { claim: claim_name.to_string() });
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }

        warn!(
            "Claim {} not bound after {} attempts",
            claim_name, max_attempts
        );
        Err(timeout(max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::builders::claim;
    use crate::cluster::InMemoryCluster;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> BindPolicy {
        BindPolicy {
            max_attempts,
            retry_interval_secs: 0,
            deadline_secs: None,
        }
    }

    fn setup(policy: BindPolicy) -> (Arc<InMemoryCluster>, BindingResolver) {
        let cluster = Arc::new(InMemoryCluster::new());
        let resolver = BindingResolver::new(cluster.clone(), policy);
        (cluster, resolver)
    }

    fn ctx() -> ResolveContext {
        ResolveContext::new("etcd-a", "magellan")
    }

    #[tokio::test]
    async fn test_bound_claim_resolves_first_attempt() {
        let (cluster, resolver) = setup(fast_policy(35));
        cluster.insert_claim(claim("data-pvc", "magellan", "Bound", Some("pv-1")));

        let bound = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await
            .unwrap();

        assert_eq!(bound.volume_name, "pv-1");
        assert_eq!(bound.attempts, 1);
        assert_eq!(cluster.query_counts().claims, 1);
    }

    #[tokio::test]
    async fn test_claim_binding_later_is_retried() {
        let (cluster, resolver) = setup(fast_policy(35));
        cluster.insert_claim(claim("data-pvc", "magellan", "Pending", Some("pv-1")));
        cluster.script_claim_phases("magellan", "data-pvc", ["Pending", "Pending", "Bound"]);

        let bound = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await
            .unwrap();

        assert_eq!(bound.volume_name, "pv-1");
        assert_eq!(bound.attempts, 3);
        assert_eq!(cluster.query_counts().claims, 3);
    }

    #[tokio::test]
    async fn test_never_bound_times_out_after_max_attempts() {
        let (cluster, resolver) = setup(fast_policy(35));
        cluster.insert_claim(claim("data-pvc", "magellan", "Pending", None));

        let result = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::BindTimeout { attempts: 35, .. }));
        assert_eq!(cluster.query_counts().claims, 35);
    }

    #[tokio::test]
    async fn test_missing_claim_fails_without_retry() {
        let (cluster, resolver) = setup(fast_policy(35));
        cluster.insert_claim(claim("other-pvc", "magellan", "Bound", Some("pv-9")));

        let result = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::ClaimNotFound { claim, .. }) if claim == "data-pvc");
        assert_eq!(cluster.query_counts().claims, 1);
    }

    #[tokio::test]
    async fn test_api_error_propagates_without_retry() {
        let (cluster, resolver) = setup(fast_policy(35));
        cluster.insert_claim(claim("data-pvc", "magellan", "Bound", Some("pv-1")));
        cluster.fail_next_claim_list("etcdserver: request timed out");

        let result = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::Kube(_)));
        assert_eq!(cluster.query_counts().claims, 1);
    }

    #[tokio::test]
    async fn test_immediate_policy_fails_on_first_unbound() {
        let (cluster, resolver) = setup(BindPolicy::immediate());
        cluster.insert_claim(claim("data-pvc", "magellan", "Pending", None));

        let result = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::BindTimeout { attempts: 1, .. }));
        assert_eq!(cluster.query_counts().claims, 1);
    }

    #[tokio::test]
    async fn test_lost_claim_is_not_bound() {
        let (cluster, resolver) = setup(fast_policy(2));
        cluster.insert_claim(claim("data-pvc", "magellan", "Lost", Some("pv-1")));

        let result = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::BindTimeout { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let (cluster, resolver) = setup(BindPolicy {
            max_attempts: 35,
            retry_interval_secs: 3600,
            deadline_secs: None,
        });
        cluster.insert_claim(claim("data-pvc", "magellan", "Pending", None));

        let ctx = ctx();
        ctx.cancellation().cancel();

        let result = resolver
            .resolve_bound_volume(&ctx, "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::Cancelled { .. }));
        assert_eq!(cluster.query_counts().claims, 1);
    }

    #[tokio::test]
    async fn test_deadline_bounds_total_wait() {
        let (cluster, resolver) = setup(BindPolicy {
            max_attempts: 35,
            retry_interval_secs: 3600,
            deadline_secs: Some(0),
        });
        cluster.insert_claim(claim("data-pvc", "magellan", "Pending", None));

        let result = resolver
            .resolve_bound_volume(&ctx(), "data-pvc", "magellan")
            .await;

        assert_matches!(result, Err(Error::BindTimeout { attempts: 1, .. }));
    }

    #[test]
    fn test_claim_phase_parsing() {
        assert_eq!(
            ClaimPhase::of(&claim("a", "magellan", "Bound", None)),
            ClaimPhase::Bound
        );
        assert_eq!(
            ClaimPhase::of(&claim("a", "magellan", "Terminating", None)),
            ClaimPhase::Unknown
        );
        assert!(bound_volume_name(&claim("a", "magellan", "Bound", None)).is_none());
    }
}

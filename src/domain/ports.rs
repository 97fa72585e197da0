//! Domain Ports - Core trait definitions for the affinity resolver
//!
//! These traits define the boundaries between the resolution pipeline and
//! the cluster. Adapters implement [`ClusterReader`]; the two deployment
//! variants implement [`PlacementStrategy`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Resolution Context
// =============================================================================

/// Per-call context threaded through every stage of a resolution
///
/// Carries the identity used for diagnostics and the cancellation signal
/// for the bind wait. Cloning shares the cancellation token.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// Name of the cluster the claim belongs to
    pub cluster_name: String,
    /// Namespace holding the claim and the disk-proxy workloads
    pub namespace: String,
    cancel: CancellationToken,
}

impl ResolveContext {
    pub fn new(cluster_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            namespace: namespace.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Span that scopes every record emitted for one claim
    pub fn span(&self, claim: &str) -> tracing::Span {
        tracing::info_span!(
            "resolve",
            cluster_name = %self.cluster_name,
            cluster_namespace = %self.namespace,
            claim = %claim,
        )
    }
}

// =============================================================================
// Pipeline Stages
// =============================================================================

/// Stages of a resolution, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStage {
    Start,
    ClaimLookup,
    VolumeLookup,
    IdentityExtraction,
    PlacementLookup,
    AffinityBuilt,
}

impl std::fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStage::Start => write!(f, "start"),
            ResolutionStage::ClaimLookup => write!(f, "claim-lookup"),
            ResolutionStage::VolumeLookup => write!(f, "volume-lookup"),
            ResolutionStage::IdentityExtraction => write!(f, "identity-extraction"),
            ResolutionStage::PlacementLookup => write!(f, "placement-lookup"),
            ResolutionStage::AffinityBuilt => write!(f, "affinity-built"),
        }
    }
}

// =============================================================================
// Volume Identity
// =============================================================================

/// Reference to the attachment record a volume was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Name of the VolumeAttachment object
    pub attachment_name: String,
    /// Persistent volume the attachment references
    pub volume_name: String,
    /// Node the volume is attached to
    pub node_name: String,
}

/// Storage-system identity of a bound volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum VolumeIdentity {
    /// Numeric device id parsed from the CSI volume handle
    Device { device_id: u64 },
    /// Attachment record referencing the volume
    Attachment(AttachmentRef),
}

impl std::fmt::Display for VolumeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeIdentity::Device { device_id } => write!(f, "device {}", device_id),
            VolumeIdentity::Attachment(a) => write!(f, "attachment {}", a.attachment_name),
        }
    }
}

// =============================================================================
// Node Placement
// =============================================================================

/// Where a resolved node name came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum PlacementSource {
    /// Read from the placement of a disk-proxy StatefulSet
    DiskProxy { replica: String },
    /// Read from a VolumeAttachment
    Attachment { attachment: String },
}

/// Node currently serving a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePlacement {
    pub node_name: String,
    pub source: PlacementSource,
}

// =============================================================================
// Strategy Selection
// =============================================================================

/// Deployment variant used to get from a volume to a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Parse the CSI handle as a device id, then search disk-proxy replicas
    #[default]
    DeviceHandle,
    /// Read the node straight from the volume's attachment record
    Attachment,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::DeviceHandle => write!(f, "device-handle"),
            StrategyKind::Attachment => write!(f, "attachment"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "device-handle" | "device" | "handle" => Ok(StrategyKind::DeviceHandle),
            "attachment" | "volume-attachment" => Ok(StrategyKind::Attachment),
            other => Err(Error::Configuration(format!("Unknown strategy: {}", other))),
        }
    }
}

// =============================================================================
// Cluster Reader Port
// =============================================================================

/// Port for read-only cluster queries
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// List every claim visible in a namespace
    async fn list_claims(&self, namespace: &str) -> Result<Vec<PersistentVolumeClaim>>;

    /// Get a persistent volume by name
    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>>;

    /// List volume attachments, optionally filtered by label selector
    async fn list_attachments(&self, label_selector: Option<&str>)
        -> Result<Vec<VolumeAttachment>>;

    /// List StatefulSets in a namespace matching a label selector
    async fn list_stateful_sets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<StatefulSet>>;
}

// =============================================================================
// Placement Strategy Port
// =============================================================================

/// Port for the identity and placement half of the pipeline
#[async_trait]
pub trait PlacementStrategy: Send + Sync {
    /// Strategy variant
    fn kind(&self) -> StrategyKind;

    /// Extract the storage-system identity of a bound volume
    async fn volume_identity(
        &self,
        ctx: &ResolveContext,
        volume_name: &str,
    ) -> Result<VolumeIdentity>;

    /// Locate the node serving a volume identity
    async fn locate(
        &self,
        ctx: &ResolveContext,
        identity: &VolumeIdentity,
    ) -> Result<NodePlacement>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ClusterReaderRef = Arc<dyn ClusterReader>;
pub type PlacementStrategyRef = Arc<dyn PlacementStrategy>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!(
            "device-handle".parse::<StrategyKind>().unwrap(),
            StrategyKind::DeviceHandle
        );
        assert_eq!(
            "Attachment".parse::<StrategyKind>().unwrap(),
            StrategyKind::Attachment
        );
        assert!("rdma".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_strategy_kind_display_round_trips() {
        for kind in [StrategyKind::DeviceHandle, StrategyKind::Attachment] {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_context_clone_shares_cancellation() {
        let ctx = ResolveContext::new("etcd-a", "magellan");
        let other = ctx.clone();
        ctx.cancellation().cancel();
        assert!(other.cancellation().is_cancelled());
    }
}

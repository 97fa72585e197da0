//! Placement Strategies
//!
//! The two deployment variants of the volume -> node half of the pipeline:
//! - Device handle: CSI handle -> device id -> disk-proxy StatefulSet -> node
//! - Attachment: VolumeAttachment -> node

use super::config::ResolverConfig;
use super::identity::{device_id_of, find_attachment};
use super::placement::{find_disk_proxy, node_of_replica};
use crate::domain::ports::{
    ClusterReaderRef, NodePlacement, PlacementSource, PlacementStrategy, PlacementStrategyRef,
    ResolveContext, StrategyKind, VolumeIdentity,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use std::sync::Arc;
use tracing::{debug, info};

fn mismatched(kind: StrategyKind, identity: &VolumeIdentity) -> Error {
    Error::Configuration(format!("{} strategy cannot locate {}", kind, identity))
}

// =============================================================================
// Device Handle Strategy
// =============================================================================

/// Locates volumes through the disk proxy serving their device
pub struct DeviceHandleStrategy {
    reader: ClusterReaderRef,
    disk_proxy_selector: String,
    device_annotation: String,
    node_label_key: String,
}

impl DeviceHandleStrategy {
    pub fn new(reader: ClusterReaderRef, config: &ResolverConfig) -> Self {
        Self {
            reader,
            disk_proxy_selector: config.disk_proxy_selector.clone(),
            device_annotation: config.device_annotation.clone(),
            node_label_key: config.node_label_key.clone(),
        }
    }

    /// Find the disk-proxy StatefulSet serving a device
    pub async fn disk_proxy_for_device(
        &self,
        ctx: &ResolveContext,
        device_id: u64,
    ) -> Result<StatefulSet> {
        let replicas = self
            .reader
            .list_stateful_sets(&ctx.namespace, &self.disk_proxy_selector)
            .await?;
        debug!(
            "Scanning {} disk proxies labelled {} for device {}",
            replicas.len(),
            self.disk_proxy_selector,
            device_id
        );

        find_disk_proxy(&replicas, &self.device_annotation, device_id)
            .cloned()
            .ok_or_else(|| Error::PlacementNotFound {
                device_id,
                namespace: ctx.namespace.clone(),
            })
    }
}

#[async_trait]
impl PlacementStrategy for DeviceHandleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DeviceHandle
    }

    async fn volume_identity(
        &self,
        _ctx: &ResolveContext,
        volume_name: &str,
    ) -> Result<VolumeIdentity> {
        info!("Getting device id of volume {}", volume_name);

        let volume = self
            .reader
            .get_volume(volume_name)
            .await?
            .ok_or_else(|| Error::VolumeNotFound {
                volume: volume_name.to_string(),
            })?;

        let device_id = device_id_of(volume_name, &volume)?;
        Ok(VolumeIdentity::Device { device_id })
    }

    async fn locate(
        &self,
        ctx: &ResolveContext,
        identity: &VolumeIdentity,
    ) -> Result<NodePlacement> {
        let device_id = match identity {
            VolumeIdentity::Device { device_id } => *device_id,
            other => return Err(mismatched(self.kind(), other)),
        };

        let replica = self.disk_proxy_for_device(ctx, device_id).await?;
        let replica_name = replica.metadata.name.clone().unwrap_or_default();

        let node_name = node_of_replica(&replica, &self.node_label_key).ok_or_else(|| {
            Error::ReplicaUnplaced {
                replica: replica_name.clone(),
            }
        })?;

        info!(
            "Device {} is served by {} on node {}",
            device_id, replica_name, node_name
        );
        Ok(NodePlacement {
            node_name,
            source: PlacementSource::DiskProxy {
                replica: replica_name,
            },
        })
    }
}

// =============================================================================
// Attachment Strategy
// =============================================================================

/// Locates volumes through their VolumeAttachment
pub struct AttachmentStrategy {
    reader: ClusterReaderRef,
    attachment_selector: Option<String>,
}

impl AttachmentStrategy {
    pub fn new(reader: ClusterReaderRef, config: &ResolverConfig) -> Self {
        Self {
            reader,
            attachment_selector: config.attachment_selector.clone(),
        }
    }
}

#[async_trait]
impl PlacementStrategy for AttachmentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Attachment
    }

    async fn volume_identity(
        &self,
        _ctx: &ResolveContext,
        volume_name: &str,
    ) -> Result<VolumeIdentity> {
        info!("Getting attachment of volume {}", volume_name);

        let attachments = self
            .reader
            .list_attachments(self.attachment_selector.as_deref())
            .await?;
        let attachment = find_attachment(&attachments, volume_name)?;

        debug!(
            "Volume {} is attached through {}",
            volume_name, attachment.attachment_name
        );
        Ok(VolumeIdentity::Attachment(attachment))
    }

    async fn locate(
        &self,
        _ctx: &ResolveContext,
        identity: &VolumeIdentity,
    ) -> Result<NodePlacement> {
        let attachment = match identity {
            VolumeIdentity::Attachment(a) => a,
            other => return Err(mismatched(self.kind(), other)),
        };

        if attachment.node_name.is_empty() {
            return Err(Error::AttachmentNotFound {
                volume: attachment.volume_name.clone(),
            });
        }

        info!(
            "Volume {} is attached to node {}",
            attachment.volume_name, attachment.node_name
        );
        Ok(NodePlacement {
            node_name: attachment.node_name.clone(),
            source: PlacementSource::Attachment {
                attachment: attachment.attachment_name.clone(),
            },
        })
    }
}

// =============================================================================
// Strategy Factory
// =============================================================================

/// Factory for creating placement strategies
pub struct StrategyFactory;

impl StrategyFactory {
    /// Create the strategy for a deployment variant
    pub fn create(
        kind: StrategyKind,
        reader: ClusterReaderRef,
        config: &ResolverConfig,
    ) -> PlacementStrategyRef {
        match kind {
            StrategyKind::DeviceHandle => Arc::new(DeviceHandleStrategy::new(reader, config)),
            StrategyKind::Attachment => Arc::new(AttachmentStrategy::new(reader, config)),
        }
    }
}

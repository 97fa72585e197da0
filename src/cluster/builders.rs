//! Object Builders
//!
//! Minimal constructors for the cluster objects the resolver reads. Used to
//! seed [`InMemoryCluster`](super::InMemoryCluster) and in benchmarks.

use crate::resolver::affinity::build_node_affinity;
use crate::resolver::config::{DEVICE_ANNOTATION_KEY, NODE_HOSTNAME_LABEL};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, PersistentVolume, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimStatus, PersistentVolumeSpec, PodSpec,
    PodTemplateSpec,
};
use k8s_openapi::api::storage::v1::{VolumeAttachment, VolumeAttachmentSource, VolumeAttachmentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// CSI driver name stamped on built volumes
pub const DISK_PROXY_CSI_DRIVER: &str = "disk.magellan.io";

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

/// Claim in the given phase, optionally referencing a volume
pub fn claim(
    name: &str,
    namespace: &str,
    phase: &str,
    volume_name: Option<&str>,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(name, Some(namespace)),
        spec: Some(PersistentVolumeClaimSpec {
            volume_name: volume_name.map(str::to_string),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

/// Volume backed by the disk-proxy CSI driver with the given handle
pub fn csi_volume(name: &str, volume_handle: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(name, None),
        spec: Some(PersistentVolumeSpec {
            csi: Some(CSIPersistentVolumeSource {
                driver: DISK_PROXY_CSI_DRIVER.to_string(),
                volume_handle: volume_handle.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

/// Volume with no CSI source at all
pub fn plain_volume(name: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: meta(name, None),
        spec: Some(PersistentVolumeSpec::default()),
        status: None,
    }
}

/// Attachment of a persistent volume to a node
pub fn attachment(name: &str, volume_name: &str, node_name: &str) -> VolumeAttachment {
    VolumeAttachment {
        metadata: meta(name, None),
        spec: VolumeAttachmentSpec {
            attacher: DISK_PROXY_CSI_DRIVER.to_string(),
            node_name: node_name.to_string(),
            source: VolumeAttachmentSource {
                persistent_volume_name: Some(volume_name.to_string()),
                ..Default::default()
            },
        },
        status: None,
    }
}

/// Disk-proxy StatefulSet serving `devices`, pinned to `node_name` if given
///
/// `devices` is the raw annotation value, e.g. `"42 nvme0,7 nvme1"`.
pub fn disk_proxy(
    name: &str,
    namespace: &str,
    devices: &str,
    node_name: Option<&str>,
) -> StatefulSet {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), "disk-proxy".to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(DEVICE_ANNOTATION_KEY.to_string(), devices.to_string());

    StatefulSet {
        metadata: ObjectMeta {
            labels: Some(labels),
            ..meta(name, Some(namespace))
        },
        spec: Some(StatefulSetSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: node_name.map(|n| build_node_affinity(NODE_HOSTNAME_LABEL, n)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

//! Placement Locator
//!
//! Finds the disk-proxy StatefulSet that serves a device and reads the node
//! it is placed on.
//!
//! Disk proxies advertise their devices in a pod template annotation as
//! comma-separated tuples whose first whitespace-separated token is the
//! device id:
//!
//! ```text
//! disks: "42 0000:5e:00.0 nvme0, 7 0000:5f:00.0 nvme1"
//! ```

use super::affinity::required_node_name;
use k8s_openapi::api::apps::v1::StatefulSet;
use tracing::{debug, warn};

// =============================================================================
// Device List
// =============================================================================

/// One tuple of a device-list annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEntry<'a> {
    /// Leading token, compared as a decimal string
    pub device_id: &'a str,
    /// Remaining tuple text (bus address, device name, ...)
    pub info: &'a str,
}

/// Parse a device-list annotation, skipping empty tuples
pub fn parse_device_list(annotation: &str) -> impl Iterator<Item = DeviceEntry<'_>> {
    annotation.split(',').filter_map(|tuple| {
        let tuple = tuple.trim();
        let mut parts = tuple.splitn(2, char::is_whitespace);
        let device_id = parts.next().filter(|id| !id.is_empty())?;
        Some(DeviceEntry {
            device_id,
            info: parts.next().unwrap_or("").trim(),
        })
    })
}

/// Whether a device list names `device_id`
///
/// Matching is on the decimal rendering, so `"007"` does not name device 7.
pub fn serves_device(annotation: &str, device_id: u64) -> bool {
    let wanted = device_id.to_string();
    parse_device_list(annotation).any(|entry| entry.device_id == wanted)
}

// =============================================================================
// Replica Lookup
// =============================================================================

fn replica_name(sts: &StatefulSet) -> &str {
    sts.metadata.name.as_deref().unwrap_or("<unnamed>")
}

/// Device-list annotation on a StatefulSet's pod template
pub fn device_annotation<'a>(sts: &'a StatefulSet, key: &str) -> Option<&'a str> {
    sts.spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(key)
        .map(String::as_str)
}

/// First replica whose device list names `device_id`
///
/// Further matches are reported as ambiguous; listing order decides.
pub fn find_disk_proxy<'a>(
    replicas: &'a [StatefulSet],
    annotation_key: &str,
    device_id: u64,
) -> Option<&'a StatefulSet> {
    let mut matches = replicas.iter().filter(|sts| {
        let devices = device_annotation(sts, annotation_key).unwrap_or("");
        debug!(
            "Searching {} for device id {} in disks list: {}",
            replica_name(sts),
            device_id,
            devices
        );
        serves_device(devices, device_id)
    });

    let found = matches.next()?;
    let others: Vec<&str> = matches.map(replica_name).collect();
    if !others.is_empty() {
        warn!(
            "Device {} is also served by {:?}, using {}",
            device_id,
            others,
            replica_name(found)
        );
    }
    Some(found)
}

/// Node a replica is placed on
///
/// Checked in order: the pod template `nodeName`, its `nodeSelector` entry
/// for `node_label_key`, then a required node affinity pinning a single
/// node on that label.
pub fn node_of_replica(sts: &StatefulSet, node_label_key: &str) -> Option<String> {
    let pod = sts.spec.as_ref()?.template.spec.as_ref()?;

    if let Some(node) = pod.node_name.as_deref().filter(|n| !n.is_empty()) {
        return Some(node.to_string());
    }

    if let Some(node) = pod
        .node_selector
        .as_ref()
        .and_then(|s| s.get(node_label_key))
        .filter(|n| !n.is_empty())
    {
        return Some(node.clone());
    }

    pod.affinity
        .as_ref()
        .and_then(|a| required_node_name(a, node_label_key))
        .map(str::to_string)
}

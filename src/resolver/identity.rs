//! Volume Identity Extraction
//!
//! Turns a bound volume into the identity its storage backend knows it by:
//! either the numeric device id carried in the CSI volume handle, or the
//! attachment record that references it.

use crate::domain::ports::AttachmentRef;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use tracing::{debug, warn};

/// Parse a CSI volume handle into a device id
///
/// The handle is trimmed; an absent or blank handle is an invalid spec, a
/// handle that is not an unsigned 64-bit decimal is malformed.
pub fn parse_volume_handle(volume_name: &str, handle: Option<&str>) -> Result<u64> {
    let handle = handle.ok_or_else(|| Error::InvalidVolumeSpec {
        volume: volume_name.to_string(),
        reason: "no CSI source".into(),
    })?;

    let trimmed = handle.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidVolumeSpec {
            volume: volume_name.to_string(),
            reason: format!("empty CSI volume handle {:?}", handle),
        });
    }

    let malformed = || Error::MalformedIdentity {
        volume: volume_name.to_string(),
        handle: trimmed.to_string(),
    };

    // u64::from_str also takes a leading '+'
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    trimmed.parse::<u64>().map_err(|_| malformed())
}

/// CSI volume handle of a persistent volume, if it has a CSI source
pub fn volume_handle(volume: &PersistentVolume) -> Option<&str> {
    volume
        .spec
        .as_ref()
        .and_then(|s| s.csi.as_ref())
        .map(|csi| csi.volume_handle.as_str())
}

/// Device id of a persistent volume
pub fn device_id_of(volume_name: &str, volume: &PersistentVolume) -> Result<u64> {
    let device_id = parse_volume_handle(volume_name, volume_handle(volume))?;
    debug!("Volume {} has device id {}", volume_name, device_id);
    Ok(device_id)
}

/// Find the attachment record referencing a volume
///
/// First match wins; further matches are reported as ambiguous.
pub fn find_attachment(
    attachments: &[VolumeAttachment],
    volume_name: &str,
) -> Result<AttachmentRef> {
    let mut matches = attachments
        .iter()
        .filter(|a| a.spec.source.persistent_volume_name.as_deref() == Some(volume_name));

    let first = matches.next().ok_or_else(|| Error::AttachmentNotFound {
        volume: volume_name.to_string(),
    })?;

    let others: Vec<&str> = matches
        .filter_map(|a| a.metadata.name.as_deref())
        .collect();
    if !others.is_empty() {
        warn!(
            "Volume {} has {} extra attachment(s) {:?}, using the first",
            volume_name,
            others.len(),
            others
        );
    }

    Ok(AttachmentRef {
        attachment_name: first.metadata.name.clone().unwrap_or_default(),
        volume_name: volume_name.to_string(),
        node_name: first.spec.node_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::builders::{attachment, csi_volume, plain_volume};
    use assert_matches::assert_matches;

    #[test]
    fn test_handle_is_trimmed() {
        assert_eq!(parse_volume_handle("pv-1", Some("  42  ")).unwrap(), 42);
        assert_eq!(parse_volume_handle("pv-1", Some("\t7\n")).unwrap(), 7);
    }

    #[test]
    fn test_blank_or_absent_handle_is_invalid_spec() {
        assert_matches!(
            parse_volume_handle("pv-1", Some("")),
            Err(Error::InvalidVolumeSpec { .. })
        );
        assert_matches!(
            parse_volume_handle("pv-1", Some("   ")),
            Err(Error::InvalidVolumeSpec { .. })
        );
        assert_matches!(
            parse_volume_handle("pv-1", None),
            Err(Error::InvalidVolumeSpec { volume, .. }) if volume == "pv-1"
        );
    }

    #[test]
    fn test_non_numeric_handle_is_malformed() {
        assert_matches!(
            parse_volume_handle("pv-1", Some("abc")),
            Err(Error::MalformedIdentity { handle, .. }) if handle == "abc"
        );
        assert_matches!(
            parse_volume_handle("pv-1", Some("-3")),
            Err(Error::MalformedIdentity { .. })
        );
        assert_matches!(
            parse_volume_handle("pv-1", Some("+3")),
            Err(Error::MalformedIdentity { .. })
        );
        assert_matches!(
            parse_volume_handle("pv-1", Some("18446744073709551616")),
            Err(Error::MalformedIdentity { .. })
        );
    }

    #[test]
    fn test_device_id_of_volume() {
        assert_eq!(device_id_of("pv-1", &csi_volume("pv-1", " 7 ")).unwrap(), 7);
        assert_matches!(
            device_id_of("pv-2", &plain_volume("pv-2")),
            Err(Error::InvalidVolumeSpec { .. })
        );
    }

    #[test]
    fn test_find_attachment_by_volume() {
        let attachments = vec![
            attachment("csi-aaa", "pv-0", "node-b"),
            attachment("csi-bbb", "pv-1", "node-a"),
        ];

        let found = find_attachment(&attachments, "pv-1").unwrap();
        assert_eq!(found.attachment_name, "csi-bbb");
        assert_eq!(found.node_name, "node-a");
    }

    #[test]
    fn test_first_attachment_wins() {
        let attachments = vec![
            attachment("csi-aaa", "pv-1", "node-a"),
            attachment("csi-bbb", "pv-1", "node-b"),
        ];
        assert_eq!(find_attachment(&attachments, "pv-1").unwrap().node_name, "node-a");
    }

    #[test]
    fn test_missing_attachment() {
        let attachments = vec![attachment("csi-aaa", "pv-0", "node-b")];
        assert_matches!(
            find_attachment(&attachments, "pv-1"),
            Err(Error::AttachmentNotFound { volume }) if volume == "pv-1"
        );
    }
}

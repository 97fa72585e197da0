//! Resolver Configuration
//!
//! Fixed deployment constants and the serde-loadable configuration that
//! overrides them.

use crate::domain::ports::StrategyKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Namespace holding claims and disk-proxy workloads
pub const DEFAULT_NAMESPACE: &str = "magellan";

/// Label selector identifying disk-proxy StatefulSets
pub const DISK_PROXY_SELECTOR: &str = "app=disk-proxy";

/// Pod template annotation listing the devices a disk proxy serves
pub const DEVICE_ANNOTATION_KEY: &str = "disks";

/// Node label the produced affinity matches on
pub const NODE_HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Claim observations before giving up on binding
pub const DEFAULT_MAX_ATTEMPTS: u32 = 35;

/// Wait between claim observations
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

// =============================================================================
// Bind Policy
// =============================================================================

/// How long to wait for a claim to bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindPolicy {
    /// Maximum number of claim observations; 1 fails on the first unbound one
    pub max_attempts: u32,
    /// Seconds to wait between observations
    pub retry_interval_secs: u64,
    /// Optional bound on the total wait, in seconds
    pub deadline_secs: Option<u64>,
}

impl Default for BindPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            deadline_secs: None,
        }
    }
}

impl BindPolicy {
    /// Observe the claim once and fail if it is not bound
    pub fn immediate() -> Self {
        Self {
            max_attempts: 1,
            retry_interval_secs: 0,
            deadline_secs: None,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

// =============================================================================
// Resolver Configuration
// =============================================================================

/// Configuration for the affinity resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverConfig {
    /// Namespace holding claims and disk proxies
    pub namespace: String,
    /// Cluster name stamped on diagnostics
    pub cluster_name: String,
    /// Identity and placement strategy
    pub strategy: StrategyKind,
    /// Label selector for disk-proxy StatefulSets
    pub disk_proxy_selector: String,
    /// Pod template annotation holding the device list
    pub device_annotation: String,
    /// Node label matched by the produced affinity
    pub node_label_key: String,
    /// Optional label selector applied when listing volume attachments
    pub attachment_selector: Option<String>,
    /// Claim binding wait
    pub bind: BindPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cluster_name: "default".to_string(),
            strategy: StrategyKind::DeviceHandle,
            disk_proxy_selector: DISK_PROXY_SELECTOR.to_string(),
            device_annotation: DEVICE_ANNOTATION_KEY.to_string(),
            node_label_key: NODE_HOSTNAME_LABEL.to_string(),
            attachment_selector: None,
            bind: BindPolicy::default(),
        }
    }
}

impl ResolverConfig {
    /// Defaults for a deployment variant
    ///
    /// Attachment deployments do not wait on binding.
    pub fn for_strategy(strategy: StrategyKind) -> Self {
        let bind = match strategy {
            StrategyKind::DeviceHandle => BindPolicy::default(),
            StrategyKind::Attachment => BindPolicy::immediate(),
        };
        Self {
            strategy,
            bind,
            ..Default::default()
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind.max_attempts == 0 {
            return Err(Error::Configuration(
                "bind.maxAttempts must be at least 1".into(),
            ));
        }
        let required = [
            ("namespace", &self.namespace),
            ("diskProxySelector", &self.disk_proxy_selector),
            ("deviceAnnotation", &self.device_annotation),
            ("nodeLabelKey", &self.node_label_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.namespace, "magellan");
        assert_eq!(config.disk_proxy_selector, "app=disk-proxy");
        assert_eq!(config.device_annotation, "disks");
        assert_eq!(config.bind.max_attempts, 35);
        assert_eq!(config.bind.retry_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_attachment_variant_does_not_wait() {
        let config = ResolverConfig::for_strategy(StrategyKind::Attachment);
        assert_eq!(config.bind, BindPolicy::immediate());
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ResolverConfig::from_yaml(
            r#"
strategy: attachment
attachmentSelector: "storage=disk-proxy"
bind:
  maxAttempts: 3
"#,
        )
        .unwrap();

        assert_eq!(config.strategy, StrategyKind::Attachment);
        assert_eq!(config.attachment_selector.as_deref(), Some("storage=disk-proxy"));
        assert_eq!(config.bind.max_attempts, 3);
        assert_eq!(config.bind.retry_interval_secs, DEFAULT_RETRY_INTERVAL_SECS);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let result = ResolverConfig::from_yaml("bind:\n  maxAttempts: 0\n");
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[test]
    fn test_validation_rejects_blank_annotation() {
        let config = ResolverConfig {
            device_annotation: " ".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(msg)) if msg.contains("deviceAnnotation"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("resolver.yaml");
        std::fs::write(&path, "namespace: storage\nclusterName: etcd-a\n").unwrap();

        let config = ResolverConfig::load(&path).unwrap();
        assert_eq!(config.namespace, "storage");
        assert_eq!(config.cluster_name, "etcd-a");
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert_matches!(
            ResolverConfig::from_yaml("strategy: rdma\n"),
            Err(Error::Yaml(_))
        );
    }
}

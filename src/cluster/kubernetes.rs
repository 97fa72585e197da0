//! Kubernetes Cluster Reader
//!
//! Read-only adapter over the Kubernetes API using `kube::Api`.

use crate::domain::ports::ClusterReader;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, error};

/// Adapter answering cluster queries through the API server
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

/// List parameters for an optional label selector
fn list_params(label_selector: Option<&str>) -> ListParams {
    match label_selector {
        Some(selector) if !selector.trim().is_empty() => ListParams::default().labels(selector),
        _ => ListParams::default(),
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_claims(&self, namespace: &str) -> Result<Vec<PersistentVolumeClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let claims = api.list(&ListParams::default()).await.map_err(|e| {
            error!("Error listing claims in {}: {}", namespace, e);
            e
        })?;
        debug!("Listed {} claims in {}", claims.items.len(), namespace);
        Ok(claims.items)
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let volume = api.get_opt(name).await.map_err(|e| {
            error!("Error getting volume {}: {}", name, e);
            e
        })?;
        Ok(volume)
    }

    async fn list_attachments(
        &self,
        label_selector: Option<&str>,
    ) -> Result<Vec<VolumeAttachment>> {
        let api: Api<VolumeAttachment> = Api::all(self.client.clone());
        let attachments = api.list(&list_params(label_selector)).await.map_err(|e| {
            error!("Error listing volume attachments: {}", e);
            e
        })?;
        debug!("Listed {} volume attachments", attachments.items.len());
        Ok(attachments.items)
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let sets = api
            .list(&list_params(Some(label_selector)))
            .await
            .map_err(|e| {
                error!(
                    "Failed to list StatefulSets in {} by label {}: {}",
                    namespace, label_selector, e
                );
                e
            })?;
        Ok(sets.items)
    }
}

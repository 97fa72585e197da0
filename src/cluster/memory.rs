//! In-Memory Cluster Reader
//!
//! Serves cluster queries from a local object set. Used for offline
//! resolution against a snapshot file and as the test double for the
//! pipeline: claim phases can be scripted per query and every query is
//! counted.

use crate::domain::ports::ClusterReader;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::VolumeAttachment;
use kube::core::ErrorResponse;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

// =============================================================================
// Snapshot
// =============================================================================

/// Serialized set of cluster objects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSnapshot {
    pub claims: Vec<PersistentVolumeClaim>,
    pub volumes: Vec<PersistentVolume>,
    pub attachments: Vec<VolumeAttachment>,
    pub stateful_sets: Vec<StatefulSet>,
}

impl ClusterSnapshot {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a snapshot from a YAML (or JSON) file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}

// =============================================================================
// Query Accounting
// =============================================================================

/// Number of queries served per object kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryCounts {
    pub claims: u32,
    pub volumes: u32,
    pub attachments: u32,
    pub stateful_sets: u32,
}

// =============================================================================
// In-Memory Cluster
// =============================================================================

#[derive(Default)]
struct ClusterState {
    claims: Vec<PersistentVolumeClaim>,
    volumes: BTreeMap<String, PersistentVolume>,
    attachments: Vec<VolumeAttachment>,
    stateful_sets: Vec<StatefulSet>,
    /// Phases a claim reports on successive lists, keyed by (namespace, name)
    phase_scripts: HashMap<(String, String), VecDeque<String>>,
    /// Message of an API failure to return from the next claim list
    claim_list_failure: Option<String>,
}

/// Cluster reader backed by local state
#[derive(Default)]
pub struct InMemoryCluster {
    state: RwLock<ClusterState>,
    claim_queries: AtomicU32,
    volume_queries: AtomicU32,
    attachment_queries: AtomicU32,
    stateful_set_queries: AtomicU32,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ClusterSnapshot) -> Self {
        let cluster = Self::new();
        {
            let mut state = cluster.state.write();
            state.claims = snapshot.claims;
            state.attachments = snapshot.attachments;
            state.stateful_sets = snapshot.stateful_sets;
            for volume in snapshot.volumes {
                let name = volume.metadata.name.clone().unwrap_or_default();
                state.volumes.insert(name, volume);
            }
        }
        cluster
    }

    pub fn insert_claim(&self, claim: PersistentVolumeClaim) {
        self.state.write().claims.push(claim);
    }

    pub fn insert_volume(&self, volume: PersistentVolume) {
        let name = volume.metadata.name.clone().unwrap_or_default();
        self.state.write().volumes.insert(name, volume);
    }

    pub fn insert_attachment(&self, attachment: VolumeAttachment) {
        self.state.write().attachments.push(attachment);
    }

    pub fn insert_stateful_set(&self, stateful_set: StatefulSet) {
        self.state.write().stateful_sets.push(stateful_set);
    }

    /// Report `phases` for a claim on successive lists
    ///
    /// Each list consumes one phase; the last one sticks.
    pub fn script_claim_phases<I, S>(&self, namespace: &str, name: &str, phases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script: VecDeque<String> = phases.into_iter().map(Into::into).collect();
        self.state
            .write()
            .phase_scripts
            .insert((namespace.to_string(), name.to_string()), script);
    }

    /// Fail the next claim list with an API error
    pub fn fail_next_claim_list(&self, message: impl Into<String>) {
        self.state.write().claim_list_failure = Some(message.into());
    }

    pub fn query_counts(&self) -> QueryCounts {
        QueryCounts {
            claims: self.claim_queries.load(Ordering::Relaxed),
            volumes: self.volume_queries.load(Ordering::Relaxed),
            attachments: self.attachment_queries.load(Ordering::Relaxed),
            stateful_sets: self.stateful_set_queries.load(Ordering::Relaxed),
        }
    }
}

/// Match labels against an equality-based selector (`a=b,c!=d,e`)
pub fn selector_matches(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);

    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

#[async_trait]
impl ClusterReader for InMemoryCluster {
    async fn list_claims(&self, namespace: &str) -> Result<Vec<PersistentVolumeClaim>> {
        self.claim_queries.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();
        if let Some(message) = state.claim_list_failure.take() {
            return Err(Error::Kube(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message,
                reason: "InternalError".into(),
                code: 500,
            })));
        }

        let ClusterState {
            claims,
            phase_scripts,
            ..
        } = &mut *state;

        let mut listed = Vec::new();
        for claim in claims.iter_mut() {
            if claim.metadata.namespace.as_deref() != Some(namespace) {
                continue;
            }
            let key = (
                namespace.to_string(),
                claim.metadata.name.clone().unwrap_or_default(),
            );
            if let Some(script) = phase_scripts.get_mut(&key) {
                let phase = if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                };
                if let Some(phase) = phase {
                    claim.status.get_or_insert_with(Default::default).phase = Some(phase);
                }
            }
            listed.push(claim.clone());
        }

        debug!("Serving {} claims from memory for {}", listed.len(), namespace);
        Ok(listed)
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>> {
        self.volume_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.state.read().volumes.get(name).cloned())
    }

    async fn list_attachments(
        &self,
        label_selector: Option<&str>,
    ) -> Result<Vec<VolumeAttachment>> {
        self.attachment_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        Ok(state
            .attachments
            .iter()
            .filter(|a| {
                label_selector
                    .map(|s| selector_matches(a.metadata.labels.as_ref(), s))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn list_stateful_sets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<StatefulSet>> {
        self.stateful_set_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        Ok(state
            .stateful_sets
            .iter()
            .filter(|s| s.metadata.namespace.as_deref() == Some(namespace))
            .filter(|s| selector_matches(s.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }
}

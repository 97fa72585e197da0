//! Error types for the disk affinity resolver
//!
//! Every lookup in the resolution pipeline fails with a variant naming the
//! key it was searching for, so callers can report exactly which hop broke.

use crate::domain::ports::ResolutionStage;
use thiserror::Error;

/// Unified error type for the resolver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resolution cancelled while waiting on claim {claim}")]
    Cancelled { claim: String },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    // =========================================================================
    // Binding Errors
    // =========================================================================
    #[error("Claim not found: {namespace}/{claim}")]
    ClaimNotFound { claim: String, namespace: String },

    #[error("Claim {namespace}/{claim} not bound after {attempts} attempts")]
    BindTimeout {
        claim: String,
        namespace: String,
        attempts: u32,
    },

    // =========================================================================
    // Volume Identity Errors
    // =========================================================================
    #[error("Volume not found: {volume}")]
    VolumeNotFound { volume: String },

    #[error("Invalid volume spec for {volume}: {reason}")]
    InvalidVolumeSpec { volume: String, reason: String },

    #[error("Malformed volume identity {handle:?} for {volume}: expected unsigned decimal")]
    MalformedIdentity { volume: String, handle: String },

    #[error("No volume attachment references volume {volume}")]
    AttachmentNotFound { volume: String },

    // =========================================================================
    // Placement Errors
    // =========================================================================
    #[error("No disk proxy in {namespace} serves device {device_id}")]
    PlacementNotFound { device_id: u64, namespace: String },

    #[error("Disk proxy {replica} serves the device but carries no node placement")]
    ReplicaUnplaced { replica: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is transient
    ///
    /// Only API failures qualify. A claim that never binds is already the
    /// product of the bind-wait retry budget and is not retried again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_))
    }

    /// Pipeline stage this error terminated in
    pub fn stage(&self) -> ResolutionStage {
        match self {
            Error::ClaimNotFound { .. } | Error::BindTimeout { .. } | Error::Cancelled { .. } => {
                ResolutionStage::ClaimLookup
            }
            Error::VolumeNotFound { .. } | Error::InvalidVolumeSpec { .. } => {
                ResolutionStage::VolumeLookup
            }
            Error::MalformedIdentity { .. } | Error::AttachmentNotFound { .. } => {
                ResolutionStage::IdentityExtraction
            }
            Error::PlacementNotFound { .. } | Error::ReplicaUnplaced { .. } => {
                ResolutionStage::PlacementLookup
            }
            _ => ResolutionStage::Start,
        }
    }
}

/// Result type alias for the resolver
pub type Result<T> = std::result::Result<T, Error>;

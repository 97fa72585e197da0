//! Disk Affinity Resolver
//!
//! Resolves the cluster node a claim's volume is served from and produces a
//! node affinity that co-locates a storage client with its storage backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         AffinityResolver                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────────────────┐   ┌─────────────┐  │
//! │  │   Binding    │──▶│    PlacementStrategy     │──▶│  Affinity   │  │
//! │  │   Resolver   │   │  ┌────────────────────┐  │   │  Builder    │  │
//! │  │ (claim→vol)  │   │  │ DeviceHandle       │  │   │ (node→req.) │  │
//! │  └──────────────┘   │  │ handle→disk proxy  │  │   └─────────────┘  │
//! │                     │  ├────────────────────┤  │                    │
//! │                     │  │ Attachment         │  │                    │
//! │                     │  │ VolumeAttachment   │  │                    │
//! │                     │  └────────────────────┘  │                    │
//! │                     └──────────────────────────┘                    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                       ClusterReader (read-only)                     │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────┐   │
//! │  │      KubeClusterReader      │  │       InMemoryCluster       │   │
//! │  └─────────────────────────────┘  └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`resolver`]: Resolution pipeline, strategies and configuration
//! - [`cluster`]: Cluster reader adapters
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod cluster;
pub mod domain;
pub mod error;
pub mod resolver;

// Re-export commonly used types
pub use cluster::{ClusterSnapshot, InMemoryCluster, KubeClusterReader};

pub use domain::ports::{
    AttachmentRef, ClusterReader, NodePlacement, PlacementSource, PlacementStrategy,
    ResolutionStage, ResolveContext, StrategyKind, VolumeIdentity,
};

pub use error::{Error, Result};

pub use resolver::{
    build_node_affinity, AffinityResolver, AttachmentStrategy, BindPolicy, BindingResolver,
    DeviceHandleStrategy, Resolution, ResolverConfig, StrategyFactory,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

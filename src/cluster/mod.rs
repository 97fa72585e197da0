//! Cluster Readers
//!
//! Adapters implementing the read-only [`ClusterReader`](crate::domain::ClusterReader) port:
//! - Kubernetes: live API server
//! - Memory: local object set (snapshots, tests)

pub mod builders;
pub mod kubernetes;
pub mod memory;

pub use kubernetes::*;
pub use memory::*;

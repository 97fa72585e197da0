//! Resolution Module
//!
//! Resolves a claim to the node serving its volume and builds the node
//! affinity pinning dependent workloads there.

pub mod affinity;
pub mod binding;
pub mod config;
pub mod identity;
pub mod pipeline;
pub mod placement;
pub mod strategy;

pub use affinity::*;
pub use binding::*;
pub use config::*;
pub use identity::*;
pub use pipeline::*;
pub use placement::*;
pub use strategy::*;

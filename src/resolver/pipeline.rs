//! Affinity Resolution Pipeline
//!
//! Composes the stages into a single resolution:
//!
//! ```text
//! claim name -> volume name -> volume identity -> node name -> affinity
//!   (binding)    (strategy)      (strategy)        (affinity builder)
//! ```
//!
//! The resolver holds no mutable state; concurrent resolutions share it.

use super::affinity::build_node_affinity;
use super::binding::BindingResolver;
use super::config::ResolverConfig;
use super::strategy::StrategyFactory;
use crate::domain::ports::{
    ClusterReaderRef, NodePlacement, PlacementStrategyRef, ResolutionStage, ResolveContext,
    StrategyKind, VolumeIdentity,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Affinity;
use serde::Serialize;
use tracing::{debug, error, info, Instrument};

// =============================================================================
// Resolution Report
// =============================================================================

/// Everything learned while resolving one claim
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub claim_name: String,
    pub namespace: String,
    pub strategy: StrategyKind,
    pub volume_name: String,
    pub bind_attempts: u32,
    pub identity: VolumeIdentity,
    pub placement: NodePlacement,
    pub affinity: Affinity,
    pub resolved_at: DateTime<Utc>,
}

// =============================================================================
// Affinity Resolver
// =============================================================================

/// Resolves claims to node affinities
pub struct AffinityResolver {
    config: ResolverConfig,
    binding: BindingResolver,
    strategy: PlacementStrategyRef,
}

impl AffinityResolver {
    /// Create a resolver using the strategy named in the config
    pub fn new(reader: ClusterReaderRef, config: ResolverConfig) -> Result<Self> {
        let strategy = StrategyFactory::create(config.strategy, reader.clone(), &config);
        Self::with_strategy(reader, config, strategy)
    }

    /// Create a resolver with an explicit strategy
    pub fn with_strategy(
        reader: ClusterReaderRef,
        config: ResolverConfig,
        strategy: PlacementStrategyRef,
    ) -> Result<Self> {
        config.validate()?;
        let binding = BindingResolver::new(reader, config.bind.clone());
        Ok(Self {
            config,
            binding,
            strategy,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Context for the configured cluster and namespace
    pub fn context(&self) -> ResolveContext {
        ResolveContext::new(&self.config.cluster_name, &self.config.namespace)
    }

    /// Node affinity pinning a workload to the node serving a claim's volume
    pub async fn create_node_affinity(
        &self,
        ctx: &ResolveContext,
        claim_name: &str,
    ) -> Result<Affinity> {
        Ok(self.resolve(ctx, claim_name).await?.affinity)
    }

    /// Run the full pipeline for a claim in the context's namespace
    pub async fn resolve(&self, ctx: &ResolveContext, claim_name: &str) -> Result<Resolution> {
        let span = ctx.span(claim_name);
        async {
            let result = self.run(ctx, claim_name).await;
            match &result {
                Ok(resolution) => info!(
                    "Claim {} resolved to node {} ({})",
                    claim_name,
                    resolution.placement.node_name,
                    ResolutionStage::AffinityBuilt
                ),
                Err(e) => error!(
                    "Resolution of claim {} failed at {}: {}",
                    claim_name,
                    e.stage(),
                    e
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, ctx: &ResolveContext, claim_name: &str) -> Result<Resolution> {
        debug!("Stage {} with {} strategy", ResolutionStage::ClaimLookup, self.strategy.kind());
        let bound = self
            .binding
            .resolve_bound_volume(ctx, claim_name, &ctx.namespace)
            .await?;

        debug!("Stage {} for {}", ResolutionStage::VolumeLookup, bound.volume_name);
        let identity = self
            .strategy
            .volume_identity(ctx, &bound.volume_name)
            .await?;

        debug!("Stage {} for {}", ResolutionStage::PlacementLookup, identity);
        let placement = self.strategy.locate(ctx, &identity).await?;

        let affinity = build_node_affinity(&self.config.node_label_key, &placement.node_name);

        Ok(Resolution {
            claim_name: claim_name.to_string(),
            namespace: ctx.namespace.clone(),
            strategy: self.strategy.kind(),
            volume_name: bound.volume_name,
            bind_attempts: bound.attempts,
            identity,
            placement,
            affinity,
            resolved_at: Utc::now(),
        })
    }
}

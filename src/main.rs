//! Disk Affinity Resolver
//!
//! Prints the node affinity that pins a workload to the node serving a
//! claim's volume.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use disk_affinity::{
    AffinityResolver, ClusterReader, ClusterSnapshot, InMemoryCluster, KubeClusterReader,
    Resolution, ResolverConfig, Result, StrategyKind,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Output encoding for the resolved affinity
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

/// Disk Affinity Resolver - pin workloads to the node serving their volume
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the claim to resolve
    #[arg(long, env = "CLAIM_NAME")]
    claim: String,

    /// Resolver configuration file (YAML)
    #[arg(long, env = "RESOLVER_CONFIG")]
    config: Option<PathBuf>,

    /// Resolve against a cluster snapshot file instead of the API server
    #[arg(long, env = "CLUSTER_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Namespace holding the claim and disk proxies
    #[arg(long, env = "RESOLVER_NAMESPACE")]
    namespace: Option<String>,

    /// Cluster name stamped on diagnostics
    #[arg(long, env = "CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// Identity strategy (device-handle, attachment)
    #[arg(long, env = "RESOLVER_STRATEGY")]
    strategy: Option<StrategyKind>,

    /// Label selector applied to volume attachments
    #[arg(long, env = "ATTACHMENT_SELECTOR")]
    attachment_selector: Option<String>,

    /// Claim observations before giving up on binding
    #[arg(long, env = "BIND_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Seconds between claim observations
    #[arg(long, env = "BIND_RETRY_INTERVAL")]
    retry_interval_secs: Option<u64>,

    /// Upper bound on the total bind wait in seconds
    #[arg(long, env = "BIND_DEADLINE")]
    deadline_secs: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "yaml")]
    output: OutputFormat,

    /// Print the full resolution report instead of the affinity alone
    #[arg(long)]
    report: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = build_config(&args)?;

    info!("Starting disk affinity resolution");
    info!("  Version: {}", disk_affinity::VERSION);
    info!("  Claim: {}/{}", config.namespace, args.claim);
    info!("  Strategy: {}", config.strategy);
    info!(
        "  Bind wait: {} attempts every {}s",
        config.bind.max_attempts, config.bind.retry_interval_secs
    );

    let reader: Arc<dyn ClusterReader> = match &args.snapshot {
        Some(path) => {
            info!("  Snapshot: {}", path.display());
            Arc::new(InMemoryCluster::from_snapshot(ClusterSnapshot::load(path)?))
        }
        None => Arc::new(KubeClusterReader::try_default().await?),
    };

    let resolver = AffinityResolver::new(reader, config)?;

    let cancel = CancellationToken::new();
    let ctx = resolver.context().with_cancellation(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling resolution");
            cancel.cancel();
        }
    });

    let resolution = resolver.resolve(&ctx, &args.claim).await?;
    println!("{}", render(&resolution, args.output, args.report)?);

    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

/// Merge the config file (or strategy defaults) with CLI overrides
fn build_config(args: &Args) -> Result<ResolverConfig> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::for_strategy(args.strategy.unwrap_or_default()),
    };

    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(cluster_name) = &args.cluster_name {
        config.cluster_name = cluster_name.clone();
    }
    if let Some(selector) = &args.attachment_selector {
        config.attachment_selector = Some(selector.clone());
    }
    if let Some(max_attempts) = args.max_attempts {
        config.bind.max_attempts = max_attempts;
    }
    if let Some(interval) = args.retry_interval_secs {
        config.bind.retry_interval_secs = interval;
    }
    if args.deadline_secs.is_some() {
        config.bind.deadline_secs = args.deadline_secs;
    }

    config.validate()?;
    Ok(config)
}

fn render(resolution: &Resolution, format: OutputFormat, report: bool) -> Result<String> {
    let out = match (format, report) {
        (OutputFormat::Yaml, false) => serde_yaml::to_string(&resolution.affinity)?,
        (OutputFormat::Yaml, true) => serde_yaml::to_string(resolution)?,
        (OutputFormat::Json, false) => serde_json::to_string_pretty(&resolution.affinity)?,
        (OutputFormat::Json, true) => serde_json::to_string_pretty(resolution)?,
    };
    Ok(out)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries the affinity
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

//! hyperv-provider: reconcile Hyper-V resources from JSON descriptors.
//!
//! Each invocation runs one create, read, update or delete call against a
//! simulated host whose state is persisted between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hyperv_mgmt::sim::SimulatedHost;
use hyperv_provider::{ProviderAuditLogger, ProviderConfig, ReconciliationDriver, ResourceKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hyper-V resource provider
#[derive(Parser, Debug)]
#[command(name = "hyperv-provider", version, about)]
struct Args {
    /// Provider configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to manage (defaults to the local machine)
    #[arg(long)]
    host: Option<String>,

    /// File holding the simulated host state
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Job poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up waiting for a job after this many seconds
    #[arg(long)]
    job_timeout_secs: Option<u64>,

    /// Reuse management sessions across calls
    #[arg(long)]
    pool_sessions: bool,

    /// Compute the result without touching the host
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a resource
    Create {
        /// Resource kind
        #[arg(long, value_enum)]
        kind: ResourceKind,

        /// Fallback name when the descriptor does not carry one
        name: String,

        /// Desired descriptor (JSON)
        desired: PathBuf,
    },

    /// Read the observed state of a resource
    Read {
        /// Resource kind
        #[arg(long, value_enum)]
        kind: ResourceKind,

        id: String,

        /// Declared descriptor (JSON), used for values the host does not report
        desired: Option<PathBuf>,
    },

    /// Update an existing resource
    Update {
        /// Resource kind
        #[arg(long, value_enum)]
        kind: ResourceKind,

        id: String,

        /// Previously observed state (JSON)
        previous: PathBuf,

        /// Desired descriptor (JSON)
        desired: PathBuf,
    },

    /// Delete a resource
    Delete {
        /// Resource kind
        #[arg(long, value_enum)]
        kind: ResourceKind,

        id: String,

        /// Last observed state (JSON)
        observed: Option<PathBuf>,
    },
}

async fn read_document(path: &Path) -> Result<serde_json::Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not valid JSON", path.display()))
}

async fn read_optional(path: Option<&Path>) -> Result<Option<serde_json::Value>> {
    match path {
        Some(path) => Ok(Some(read_document(path).await?)),
        None => Ok(None),
    }
}

async fn load_config(args: &Args) -> Result<ProviderConfig> {
    let mut config = match &args.config {
        Some(path) => ProviderConfig::load(path).await?,
        None => ProviderConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(path) = &args.state_file {
        config.state_file = path.clone();
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if args.job_timeout_secs.is_some() {
        config.job_timeout_secs = args.job_timeout_secs;
    }
    config.pool_sessions |= args.pool_sessions;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hyperv_provider=info,hyperv_mgmt=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args).await?;

    let host = SimulatedHost::load(&config.state_file)
        .await
        .with_context(|| format!("failed to load host state from {}", config.state_file.display()))?;
    let target = if config.host.is_empty() { "localhost" } else { config.host.as_str() };
    info!("Managing Hyper-V host {}", target);

    let driver = ReconciliationDriver::new(&config, Arc::new(host.clone()), Arc::new(ProviderAuditLogger::new()));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding jobs");
            on_signal.cancel();
        }
    });

    let dry_run = args.dry_run;
    let output = match &args.command {
        Command::Create { kind, name, desired } => {
            let desired = read_document(desired).await?;
            let outcome = driver.create(*kind, name, desired, dry_run, &cancel).await?;
            serde_json::to_value(outcome)?
        }
        Command::Read { kind, id, desired } => {
            let desired = read_optional(desired.as_deref()).await?;
            let outcome = driver.read(*kind, id, desired, dry_run, &cancel).await?;
            serde_json::to_value(outcome)?
        }
        Command::Update {
            kind,
            id,
            previous,
            desired,
        } => {
            let previous = read_document(previous).await?;
            let desired = read_document(desired).await?;
            let outcome = driver.update(*kind, id, previous, desired, dry_run, &cancel).await?;
            serde_json::to_value(outcome)?
        }
        Command::Delete { kind, id, observed } => {
            let observed = read_optional(observed.as_deref()).await?;
            driver.delete(*kind, id, observed, dry_run, &cancel).await?;
            serde_json::json!({ "identity": id, "deleted": !dry_run })
        }
    };

    if !dry_run {
        host.save(&config.state_file)
            .await
            .with_context(|| format!("failed to save host state to {}", config.state_file.display()))?;
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

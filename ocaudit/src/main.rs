//! ocaudit - operator catalog compliance audit
//!
//! Audits every bundle of one catalog snapshot and writes a JSON report.
//!
//! ```bash
//! ocaudit ./index --bundle-root ./bundles --disable-conformance-tests -o report.json
//! ocaudit ./catalog/index.db --config ocaudit.toml --kubeconfig ~/.kube/config
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ocaudit::services::fetcher::{ArtifactFetcher, ContainerToolFetcher, LocalDirectoryFetcher};
use ocaudit::AuditOrchestrator;
use ocaudit_common::config::{load_toml_config, ConfigOverrides, TomlConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ocaudit
#[derive(Parser, Debug)]
#[command(name = "ocaudit")]
#[command(about = "Audit an operator catalog for deprecated API compliance")]
#[command(version)]
struct Args {
    /// Catalog location: relational database file or declarative catalog directory
    catalog: PathBuf,

    /// Write the JSON report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "OCAUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Read bundle artifacts from pre-extracted directories under this root
    /// instead of pulling images
    #[arg(long, value_name = "DIR")]
    bundle_root: Option<PathBuf>,

    /// Only audit packages whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Audit at most this many bundles (0 = unlimited)
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    disable_validators: bool,

    #[arg(long)]
    disable_conformance_tests: bool,

    /// Only audit bundles whose artifact carries this label
    #[arg(long)]
    label: Option<String>,

    /// Required value for --label
    #[arg(long)]
    label_value: Option<String>,

    /// Concurrent enrichment workers
    #[arg(long)]
    workers: Option<usize>,

    /// Per-bundle time budget in seconds (0 = none)
    #[arg(long)]
    bundle_timeout: Option<u64>,

    /// Container CLI used to pull bundle images
    #[arg(long)]
    container_tool: Option<String>,

    /// Conformance test binary
    #[arg(long)]
    conformance_binary: Option<String>,

    /// Kubeconfig for conformance tests
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Base directory for per-bundle scratch directories
    #[arg(long)]
    scratch_root: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            filter: self.filter.clone(),
            limit: self.limit,
            disable_validators: self.disable_validators,
            disable_conformance_tests: self.disable_conformance_tests,
            label: self.label.clone(),
            label_value: self.label_value.clone(),
            worker_count: self.workers,
            bundle_timeout_secs: self.bundle_timeout,
            container_tool: self.container_tool.clone(),
            conformance_binary: self.conformance_binary.clone(),
            kubeconfig: self.kubeconfig.clone(),
            scratch_root: self.scratch_root.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => TomlConfig::default(),
    };

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&file_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting ocaudit {}", env!("CARGO_PKG_VERSION"));

    let mut config = file_config.audit;
    config.apply_overrides(args.overrides());

    let fetcher: Arc<dyn ArtifactFetcher> = match &args.bundle_root {
        Some(root) => {
            info!(root = %root.display(), "Using local bundle directories");
            Arc::new(LocalDirectoryFetcher::new(root))
        }
        None => {
            info!(tool = %config.container_tool, "Pulling bundle images");
            Arc::new(ContainerToolFetcher::new(config.container_tool.clone()))
        }
    };

    let report = AuditOrchestrator::new(config, fetcher)
        .run(&args.catalog)
        .await
        .with_context(|| format!("Audit of {} failed", args.catalog.display()))?;

    report
        .write(args.output.as_deref())
        .context("Failed to write report")?;

    if let Some(path) = &args.output {
        info!(path = %path.display(), "Report written");
    }
    Ok(())
}

//! Conformance test runner
//!
//! Runs an operator-sdk style `scorecard` against an extracted bundle
//! directory and collects per-test outcomes. The runner needs a cluster, so
//! [`check_environment`] must pass before the enrichment pool starts; a
//! missing binary or kubeconfig is a fatal configuration error rather than
//! something every bundle reports again.

use crate::error::{AuditError, AuditResult};
use async_trait::async_trait;
use ocaudit_common::models::{ConformanceResult, ConformanceState};
use ocaudit_common::AuditConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Conformance execution errors (per bundle)
#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error("failed to execute {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    #[error("conformance run exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unreadable conformance output: {0}")]
    Output(String),
}

/// Runs a conformance suite against a bundle directory
#[async_trait]
pub trait ConformanceRunner: Send + Sync {
    async fn run(&self, bundle_dir: &Path) -> Result<Vec<ConformanceResult>, ConformanceError>;
}

/// `<binary> scorecard <dir> --output json`
#[derive(Debug, Clone)]
pub struct ScorecardRunner {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
}

// ===== Scorecard output =====

#[derive(Debug, Deserialize)]
struct ScorecardOutput {
    #[serde(default)]
    items: Vec<ScorecardItem>,
}

#[derive(Debug, Deserialize)]
struct ScorecardItem {
    #[serde(default)]
    status: ScorecardStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ScorecardStatus {
    #[serde(default)]
    results: Vec<ScorecardTest>,
}

#[derive(Debug, Deserialize)]
struct ScorecardTest {
    name: String,
    state: String,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

impl ScorecardRunner {
    pub fn new(binary: impl Into<PathBuf>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl ConformanceRunner for ScorecardRunner {
    async fn run(&self, bundle_dir: &Path) -> Result<Vec<ConformanceResult>, ConformanceError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("scorecard")
            .arg(bundle_dir)
            .args(["--output", "json"])
            .kill_on_drop(true);
        if let Some(kubeconfig) = &self.kubeconfig {
            command.arg("--kubeconfig").arg(kubeconfig);
        }

        debug!(binary = %self.binary.display(), dir = %bundle_dir.display(), "Running scorecard");
        let output = command.output().await.map_err(|source| ConformanceError::Spawn {
            binary: self.binary.display().to_string(),
            source,
        })?;

        // scorecard exits non-zero when a test fails; the JSON is still authoritative
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_scorecard_output(&stdout) {
            Ok(results) => Ok(results),
            Err(_) if !output.status.success() => Err(ConformanceError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Parse `scorecard --output json`
pub fn parse_scorecard_output(raw: &str) -> Result<Vec<ConformanceResult>, ConformanceError> {
    let output: ScorecardOutput =
        serde_json::from_str(raw.trim()).map_err(|e| ConformanceError::Output(e.to_string()))?;

    Ok(output
        .items
        .into_iter()
        .flat_map(|item| item.status.results)
        .map(|test| ConformanceResult {
            state: match test.state.as_str() {
                "pass" => ConformanceState::Pass,
                "fail" => ConformanceState::Fail,
                _ => ConformanceState::Error,
            },
            name: test.name,
            errors: test.errors.unwrap_or_default(),
        })
        .collect())
}

/// Preflight for the conformance stage
///
/// Resolves the conformance binary on `PATH` and the kubeconfig (configured
/// value, else `$HOME/.kube/config`).
pub fn check_environment(config: &AuditConfig) -> AuditResult<ScorecardRunner> {
    let binary = which::which(&config.conformance_binary).map_err(|e| {
        AuditError::ExecutionEnvironment(format!(
            "conformance binary {:?} not found: {}",
            config.conformance_binary, e
        ))
    })?;

    let kubeconfig = match &config.kubeconfig {
        Some(path) => path.clone(),
        None => default_kubeconfig().ok_or_else(|| {
            AuditError::ExecutionEnvironment(
                "no kubeconfig configured and no default kubeconfig found".to_string(),
            )
        })?,
    };
    if !kubeconfig.is_file() {
        return Err(AuditError::ExecutionEnvironment(format!(
            "kubeconfig {} is not a readable file",
            kubeconfig.display()
        )));
    }

    info!(
        binary = %binary.display(),
        kubeconfig = %kubeconfig.display(),
        "Conformance environment available"
    );
    Ok(ScorecardRunner::new(binary, Some(kubeconfig)))
}

fn default_kubeconfig() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    let path = PathBuf::from(home).join(".kube").join("config");
    path.is_file().then_some(path)
}

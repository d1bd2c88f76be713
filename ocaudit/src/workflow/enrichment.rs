//! Per-bundle enrichment
//!
//! One call to [`BundleEnricher::enrich`] takes a catalog-only bundle record
//! through every enrichment step:
//!
//! 1. Fetch the artifact into a fresh bundle-named scratch directory
//! 2. Apply the artifact label filter (when configured)
//! 3. Parse the manifest set
//! 4. Run static validators (unless disabled)
//! 5. Run the conformance suite (unless disabled)
//! 6. Release the artifact and remove the scratch directory
//!
//! Failures in steps 1-5 are recorded on the bundle with their stage; they
//! never surface as `Err`. A failed fetch ends the bundle's pipeline, a failed
//! parse skips only the validators. Step 6 runs on every path, including a
//! per-bundle timeout.

use crate::services::fetcher::ArtifactFetcher;
use crate::services::manifest_parser::{parse_bundle_dir, BundleManifest};
use crate::services::scorecard_runner::ConformanceRunner;
use crate::services::scratch::ScratchDir;
use crate::validators::ValidatorSuite;
use ocaudit_common::models::{AuditStage, Bundle};
use ocaudit_common::AuditConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Facts recovered from a bundle's parsed manifest set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestFacts {
    pub csv_name: String,
    pub package_name: Option<String>,
    pub version: Option<String>,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub ocp_label: Option<String>,
    pub max_ocp_version: Option<String>,
    pub architectures: Vec<String>,
    pub builder: Option<String>,
    pub infrastructure_features: Option<String>,
}

impl From<&BundleManifest> for ManifestFacts {
    fn from(manifest: &BundleManifest) -> Self {
        Self {
            csv_name: manifest.csv.name.clone(),
            package_name: manifest.package_name().map(str::to_string),
            version: manifest.csv.version.clone(),
            replaces: manifest.csv.replaces.clone(),
            skips: manifest.csv.skips.clone(),
            ocp_label: manifest.ocp_label().map(str::to_string),
            max_ocp_version: manifest.max_ocp_version(),
            architectures: manifest.architectures(),
            builder: manifest.builder().map(str::to_string),
            infrastructure_features: manifest.infrastructure_features().map(str::to_string),
        }
    }
}

/// Bundle record after enrichment, with its manifest facts if parsing succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBundle {
    pub bundle: Bundle,
    pub manifest: Option<ManifestFacts>,
}

impl EnrichedBundle {
    pub fn new(bundle: Bundle) -> Self {
        Self {
            bundle,
            manifest: None,
        }
    }

    fn record(&mut self, stage: AuditStage, message: impl Into<String>) {
        let message = message.into();
        warn!(bundle = %self.bundle.name, %stage, error = %message, "Bundle enrichment step failed");
        self.bundle.push_error(stage, message);
    }
}

/// Artifact label restriction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub label: String,
    pub value: Option<String>,
}

impl LabelFilter {
    pub fn from_config(config: &AuditConfig) -> Option<Self> {
        config.label.as_ref().map(|label| Self {
            label: label.clone(),
            value: config.label_value.clone(),
        })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match (labels.get(&self.label), &self.value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        }
    }
}

/// Runs the enrichment steps for one bundle at a time
#[derive(Clone)]
pub struct BundleEnricher {
    fetcher: Arc<dyn ArtifactFetcher>,
    validators: Option<Arc<ValidatorSuite>>,
    conformance: Option<Arc<dyn ConformanceRunner>>,
    label_filter: Option<LabelFilter>,
    scratch_root: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl BundleEnricher {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            fetcher,
            validators: None,
            conformance: None,
            label_filter: None,
            scratch_root: None,
            timeout: None,
        }
    }

    /// Enricher wired from the run configuration
    ///
    /// `conformance` must already have passed its environment preflight; it
    /// is ignored when conformance tests are disabled.
    pub fn from_config(
        config: &AuditConfig,
        fetcher: Arc<dyn ArtifactFetcher>,
        conformance: Option<Arc<dyn ConformanceRunner>>,
    ) -> Self {
        let mut enricher = Self::new(fetcher);
        if !config.disable_validators {
            enricher = enricher.with_validators(ValidatorSuite::default());
        }
        if !config.disable_conformance_tests {
            enricher.conformance = conformance;
        }
        enricher.label_filter = LabelFilter::from_config(config);
        enricher.scratch_root = config.scratch_root.clone();
        if config.bundle_timeout_secs > 0 {
            enricher.timeout = Some(Duration::from_secs(config.bundle_timeout_secs));
        }
        enricher
    }

    pub fn with_validators(mut self, suite: ValidatorSuite) -> Self {
        self.validators = Some(Arc::new(suite));
        self
    }

    pub fn with_conformance(mut self, runner: Arc<dyn ConformanceRunner>) -> Self {
        self.conformance = Some(runner);
        self
    }

    pub fn with_label_filter(mut self, filter: LabelFilter) -> Self {
        self.label_filter = Some(filter);
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enrich one bundle; never fails, errors are recorded on the bundle
    pub async fn enrich(&self, bundle: Bundle) -> EnrichedBundle {
        let mut enriched = EnrichedBundle::new(bundle);

        if enriched.bundle.image.trim().is_empty() {
            enriched.record(AuditStage::Fetch, "bundle has no artifact reference");
            return enriched;
        }

        let scratch = match ScratchDir::create(&enriched.bundle.name, self.scratch_root.as_deref()) {
            Ok(scratch) => scratch,
            Err(e) => {
                enriched.record(AuditStage::Extract, format!("failed to create scratch directory: {e}"));
                return enriched;
            }
        };

        match self.timeout {
            Some(limit) => {
                let steps = self.run_steps(&mut enriched, scratch.path());
                if tokio::time::timeout(limit, steps).await.is_err() {
                    enriched.record(
                        AuditStage::Timeout,
                        format!("enrichment exceeded {}s", limit.as_secs()),
                    );
                }
            }
            None => self.run_steps(&mut enriched, scratch.path()).await,
        }

        self.cleanup(&enriched.bundle, scratch).await;
        enriched
    }

    async fn run_steps(&self, enriched: &mut EnrichedBundle, scratch: &Path) {
        let reference = enriched.bundle.image.clone();

        let artifact = match self.fetcher.fetch(&reference, scratch).await {
            Ok(artifact) => artifact,
            Err(e) => {
                enriched.record(e.stage(), e.to_string());
                return;
            }
        };
        debug!(bundle = %enriched.bundle.name, fetcher = self.fetcher.name(), "Artifact fetched");

        if let Some(filter) = &self.label_filter {
            if !filter.matches(&artifact.labels) {
                debug!(bundle = %enriched.bundle.name, label = %filter.label, "Bundle excluded by label filter");
                enriched.bundle.filtered_out = true;
                return;
            }
        }

        let manifest_dir = artifact.manifest_dir.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_bundle_dir(&manifest_dir)).await;
        let manifest = match parsed {
            Ok(Ok(manifest)) => Some(manifest),
            Ok(Err(e)) => {
                enriched.record(AuditStage::Parse, e.to_string());
                None
            }
            Err(e) => {
                enriched.record(AuditStage::Parse, format!("parse task failed: {e}"));
                None
            }
        };

        if let Some(manifest) = &manifest {
            enriched.manifest = Some(ManifestFacts::from(manifest));
            if let Some(suite) = &self.validators {
                let outcome = suite.run(manifest);
                enriched.bundle.validator_messages.extend(outcome.messages);
                for failure in outcome.failures {
                    enriched.record(AuditStage::Validate, failure.to_string());
                }
            }
        }

        // Conformance only needs the manifest directory
        if let Some(runner) = &self.conformance {
            match runner.run(&artifact.manifest_dir).await {
                Ok(results) => enriched.bundle.conformance_results = Some(results),
                Err(e) => enriched.record(AuditStage::Conformance, e.to_string()),
            }
        }
    }

    async fn cleanup(&self, bundle: &Bundle, scratch: ScratchDir) {
        if let Err(e) = self.fetcher.release(&bundle.image).await {
            warn!(bundle = %bundle.name, error = %e, "Failed to release artifact");
        }
        let path = scratch.path_buf();
        if let Err(e) = scratch.close() {
            warn!(bundle = %bundle.name, path = %path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

impl std::fmt::Debug for BundleEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleEnricher")
            .field("fetcher", &self.fetcher.name())
            .field("validators", &self.validators)
            .field("conformance", &self.conformance.is_some())
            .field("label_filter", &self.label_filter)
            .field("scratch_root", &self.scratch_root)
            .field("timeout", &self.timeout)
            .finish()
    }
}

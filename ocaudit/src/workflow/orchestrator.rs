//! Audit run orchestration
//!
//! # Stages
//! 1. Validate configuration
//! 2. Conformance preflight (when conformance tests are enabled)
//! 3. Open and load the catalog
//! 4. Enrich every bundle on the bounded worker pool
//! 5. Build the canonical model
//! 6. Classify and grade packages
//! 7. Assemble the report
//!
//! Stages 1-3 fail the run. From stage 4 on, failures are per bundle and end
//! up in the report.

use crate::catalog::CatalogSource;
use crate::classify::{classify, grade_package, DeprecationPatternTable, GradeContext};
use crate::error::{AuditError, AuditResult};
use crate::report::{AuditReport, CatalogInfo};
use crate::services::fetcher::ArtifactFetcher;
use crate::services::scorecard_runner::{check_environment, ConformanceRunner};
use crate::workflow::enrichment::BundleEnricher;
use crate::workflow::model_builder;
use crate::workflow::worker_pool::WorkerPool;
use ocaudit_common::models::Bundle;
use ocaudit_common::AuditConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runs one audit pass over one catalog
pub struct AuditOrchestrator {
    config: AuditConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
    conformance: Option<Arc<dyn ConformanceRunner>>,
}

impl AuditOrchestrator {
    pub fn new(config: AuditConfig, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            config,
            fetcher,
            conformance: None,
        }
    }

    /// Use `runner` for conformance tests instead of locating one on the host
    pub fn with_conformance_runner(mut self, runner: Arc<dyn ConformanceRunner>) -> Self {
        self.conformance = Some(runner);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub async fn run(&self, location: &Path) -> AuditResult<AuditReport> {
        let started = Instant::now();
        let config = &self.config;

        config.validate()?;
        let patterns = DeprecationPatternTable::from_config(config)?;
        let conformance = self.preflight()?;

        let source = CatalogSource::open(location).await?;
        let format = source.format();
        let snapshot = source.load(config).await?;

        let enricher = BundleEnricher::from_config(config, self.fetcher.clone(), conformance);
        let pool = WorkerPool::new("enrichment", config.worker_count);
        let queue: Vec<Bundle> = snapshot.bundles().cloned().collect();
        let enriched = pool.run(queue, |bundle| enricher.enrich(bundle)).await;

        let model = model_builder::build(snapshot, enriched, &patterns);
        let classification = classify(&model.packages);

        let context = GradeContext {
            validators_ran: !config.disable_validators,
            conformance_ran: !config.disable_conformance_tests,
        };
        let grades = model
            .packages
            .iter()
            .filter_map(|package| {
                classification
                    .tier_of(&package.name)
                    .map(|tier| grade_package(package, tier, context))
            })
            .collect();

        let report = AuditReport::new(
            CatalogInfo {
                location: location.to_path_buf(),
                format,
            },
            config.clone(),
            model,
            classification,
            grades,
        );

        if report.summary.bundles_with_errors > 0 {
            warn!(
                bundles_with_errors = report.summary.bundles_with_errors,
                "Some bundles were audited with partial data; see their error lists"
            );
        }
        info!(
            packages = report.summary.packages,
            bundles = report.summary.bundles,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Audit complete"
        );
        Ok(report)
    }

    fn preflight(&self) -> AuditResult<Option<Arc<dyn ConformanceRunner>>> {
        if self.config.disable_conformance_tests {
            return Ok(None);
        }
        if let Some(runner) = &self.conformance {
            return Ok(Some(runner.clone()));
        }
        let runner = check_environment(&self.config)?;
        Ok(Some(Arc::new(runner)))
    }
}

impl std::fmt::Debug for AuditOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditOrchestrator")
            .field("config", &self.config)
            .field("fetcher", &self.fetcher.name())
            .field("conformance", &self.conformance.is_some())
            .finish()
    }
}

/// Shorthand for a run with conformance tests disabled
pub async fn audit_catalog(
    location: &Path,
    mut config: AuditConfig,
    fetcher: Arc<dyn ArtifactFetcher>,
) -> AuditResult<AuditReport> {
    config.disable_conformance_tests = true;
    AuditOrchestrator::new(config, fetcher).run(location).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fetcher::LocalDirectoryFetcher;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_config_fails_before_catalog() {
        let config = AuditConfig {
            label_value: Some("yes".to_string()),
            disable_conformance_tests: true,
            ..Default::default()
        };
        let orchestrator = AuditOrchestrator::new(config, Arc::new(LocalDirectoryFetcher::new("/nonexistent")));
        let err = orchestrator.run(Path::new("/nonexistent")).await.unwrap_err();
        assert!(matches!(err, AuditError::Common(_)));
    }

    #[tokio::test]
    async fn test_missing_conformance_environment_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = AuditConfig {
            conformance_binary: "ocaudit-no-such-binary-7f3a".to_string(),
            ..Default::default()
        };
        let orchestrator = AuditOrchestrator::new(config, Arc::new(LocalDirectoryFetcher::new(dir.path())));
        let err = orchestrator.run(dir.path()).await.unwrap_err();
        assert!(matches!(err, AuditError::ExecutionEnvironment(_)));
    }
}

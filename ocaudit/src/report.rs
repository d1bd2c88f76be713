//! Audit report
//!
//! The single output snapshot of a run. Field names are camelCase and stable;
//! maps are `BTreeMap`s so the serialized form does not depend on processing
//! order.

use crate::catalog::CatalogFormat;
use crate::classify::{Classification, PackageGrade};
use crate::error::{AuditError, AuditResult};
use crate::workflow::model_builder::AuditModel;
use chrono::{DateTime, Utc};
use ocaudit_common::models::{AuditStage, Bundle, Package};
use ocaudit_common::AuditConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogInfo {
    pub location: PathBuf,
    pub format: CatalogFormat,
}

/// Run counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub packages: usize,
    pub bundles: usize,
    pub unassigned_bundles: usize,
    pub filtered_out_bundles: usize,
    pub bundles_with_errors: usize,
    pub errors_by_stage: BTreeMap<AuditStage, usize>,
    pub complying: usize,
    pub partially_complying: usize,
    pub not_complying: usize,
}

impl RunSummary {
    pub fn from_model(model: &AuditModel, classification: &Classification) -> Self {
        let mut summary = Self {
            packages: model.packages.len(),
            bundles: model.bundle_count(),
            unassigned_bundles: model.unassigned_bundles.len(),
            filtered_out_bundles: model.filtered_out,
            complying: classification.complying.len(),
            partially_complying: classification.partially_complying.len(),
            not_complying: classification.not_complying.len(),
            ..Default::default()
        };
        for bundle in model.bundles() {
            if !bundle.errors.is_empty() {
                summary.bundles_with_errors += 1;
            }
            for error in &bundle.errors {
                *summary.errors_by_stage.entry(error.stage).or_default() += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub catalog: CatalogInfo,
    pub config: AuditConfig,
    pub summary: RunSummary,
    pub packages: Vec<Package>,
    pub unassigned_bundles: Vec<Bundle>,
    pub classification: Classification,
    pub grades: BTreeMap<String, PackageGrade>,
}

impl AuditReport {
    pub fn new(
        catalog: CatalogInfo,
        config: AuditConfig,
        model: AuditModel,
        classification: Classification,
        grades: Vec<PackageGrade>,
    ) -> Self {
        let summary = RunSummary::from_model(&model, &classification);
        Self {
            generated_at: Utc::now(),
            catalog,
            config,
            summary,
            packages: model.packages,
            unassigned_bundles: model.unassigned_bundles,
            classification,
            grades: grades
                .into_iter()
                .map(|g| (g.package_name.clone(), g))
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> AuditResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AuditError::Report(e.to_string()))
    }

    /// Write the report to `path`, or stdout when `None`
    pub fn write(&self, path: Option<&Path>) -> AuditResult<()> {
        let json = self.to_json_pretty()?;
        match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json + "\n").map_err(|e| {
                    AuditError::Report(format!("failed to write {}: {}", path.display(), e))
                })
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{json}")?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use tempfile::TempDir;

    fn model() -> AuditModel {
        let mut ok = Bundle::new("etcd.v2", "img");
        ok.is_head_of_channel = true;
        ok.channels.insert("stable".to_string());
        let mut broken = Bundle::new("etcd.v1", "img");
        broken.push_error(AuditStage::Fetch, "pull failed");
        broken.push_error(AuditStage::Parse, "no csv");

        let mut package = Package::new("etcd", "stable");
        package.bundles = vec![broken, ok];
        AuditModel {
            packages: vec![package],
            unassigned_bundles: vec![Bundle::new("stray", "img")],
            filtered_out: 2,
        }
    }

    fn report() -> AuditReport {
        let model = model();
        let classification = classify(&model.packages);
        AuditReport::new(
            CatalogInfo {
                location: PathBuf::from("/catalog"),
                format: CatalogFormat::Declarative,
            },
            AuditConfig::default(),
            model,
            classification,
            Vec::new(),
        )
    }

    #[test]
    fn test_summary_counts() {
        let report = report();
        assert_eq!(report.summary.packages, 1);
        assert_eq!(report.summary.bundles, 3);
        assert_eq!(report.summary.unassigned_bundles, 1);
        assert_eq!(report.summary.filtered_out_bundles, 2);
        assert_eq!(report.summary.bundles_with_errors, 1);
        assert_eq!(report.summary.errors_by_stage.get(&AuditStage::Fetch), Some(&1));
        assert_eq!(report.summary.complying, 1);
    }

    #[test]
    fn test_serialized_field_names() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json_pretty().unwrap()).unwrap();
        assert!(json.get("generatedAt").is_some());
        assert_eq!(json["catalog"]["format"], "declarative");
        assert_eq!(json["summary"]["errorsByStage"]["parse"], 1);
        assert!(json["classification"]["complying"]["etcd"].is_object());
        assert_eq!(json["unassignedBundles"][0]["name"], "stray");
    }

    #[test]
    fn test_write_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");
        report().write(Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"packages\""));
    }
}

//! OperatorHub listing metadata
//!
//! Checks the CSV annotations the OperatorHub catalog page is rendered from.
//! An unknown capability level is an error; everything else is a warning.

use super::{BundleValidator, ValidatorError};
use crate::services::manifest_parser::BundleManifest;
use ocaudit_common::models::ValidatorMessage;

pub const VALIDATOR_NAME: &str = "operatorhub";

pub const CAPABILITY_LEVELS: &[&str] = &[
    "Basic Install",
    "Seamless Upgrades",
    "Full Lifecycle",
    "Deep Insights",
    "Auto Pilot",
];

pub const CATEGORIES: &[&str] = &[
    "AI/Machine Learning",
    "Application Runtime",
    "Big Data",
    "Cloud Provider",
    "Database",
    "Developer Tools",
    "Drivers and plugins",
    "Integration & Delivery",
    "Logging & Tracing",
    "Modernization & Migration",
    "Monitoring",
    "Networking",
    "OpenShift Optional",
    "Security",
    "Storage",
    "Streaming & Messaging",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorHubValidator;

impl BundleValidator for OperatorHubValidator {
    fn name(&self) -> &'static str {
        VALIDATOR_NAME
    }

    fn validate(&self, manifest: &BundleManifest) -> Result<Vec<ValidatorMessage>, ValidatorError> {
        let annotations = &manifest.csv.annotations;
        let mut messages = Vec::new();

        match annotations.get("capabilities").map(|c| c.trim()) {
            None | Some("") => messages.push(self.warning("csv.Metadata.Annotations.Capabilities not specified")),
            Some(level) if !CAPABILITY_LEVELS.contains(&level) => messages.push(self.error(format!(
                "csv.Metadata.Annotations.Capabilities {level:?} is not a valid capabilities level"
            ))),
            Some(_) => {}
        }

        if let Some(categories) = annotations.get("categories") {
            for category in categories.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                if !CATEGORIES.contains(&category) {
                    messages.push(self.warning(format!(
                        "csv.Metadata.Annotations.Categories {category:?} is not a recognised category"
                    )));
                }
            }
        }

        if annotations.get("containerImage").map_or(true, |v| v.trim().is_empty()) {
            messages.push(self.warning("csv.Metadata.Annotations.containerImage not specified"));
        }
        if manifest.csv.description.is_none() {
            messages.push(self.warning("csv.Spec.Description not specified"));
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::manifest_parser::CsvManifest;
    use ocaudit_common::models::MessageLevel;
    use std::collections::BTreeMap;

    fn manifest(annotations: &[(&str, &str)], description: Option<&str>) -> BundleManifest {
        BundleManifest {
            csv: CsvManifest {
                name: "etcd.v0.9.4".to_string(),
                annotations: annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
                description: description.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_listing_passes() {
        let m = manifest(
            &[
                ("capabilities", "Full Lifecycle"),
                ("categories", "Database, Big Data"),
                ("containerImage", "quay.io/etcd/operator:0.9.4"),
            ],
            Some("etcd operator"),
        );
        assert!(OperatorHubValidator.validate(&m).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_capability_is_error() {
        let m = manifest(
            &[("capabilities", "Magic"), ("containerImage", "img")],
            Some("d"),
        );
        let messages = OperatorHubValidator.validate(&m).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, MessageLevel::Error);
    }

    #[test]
    fn test_missing_fields_are_warnings() {
        let messages = OperatorHubValidator
            .validate(&manifest(&[("categories", "Games")], None))
            .unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages.iter().all(|m| m.level == MessageLevel::Warning));
    }
}

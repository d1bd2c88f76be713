//! ClusterServiceVersion identity checks

use super::{BundleValidator, ValidatorError};
use crate::services::manifest_parser::BundleManifest;
use ocaudit_common::models::ValidatorMessage;
use ocaudit_common::version::is_valid_semver;

pub const VALIDATOR_NAME: &str = "csv";

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvValidator;

impl BundleValidator for CsvValidator {
    fn name(&self) -> &'static str {
        VALIDATOR_NAME
    }

    fn validate(&self, manifest: &BundleManifest) -> Result<Vec<ValidatorMessage>, ValidatorError> {
        let csv = &manifest.csv;
        if !csv.raw.is_object() {
            return Err(ValidatorError::new(
                self.name(),
                "ClusterServiceVersion document is not an object",
            ));
        }

        let mut messages = Vec::new();
        if csv.name.trim().is_empty() {
            messages.push(self.error("metadata.name is empty"));
        }

        match csv.version.as_deref().map(str::trim) {
            None | Some("") => messages.push(self.error("spec.version is not set")),
            Some(v) if !is_valid_semver(v) => {
                messages.push(self.error(format!("spec.version {v:?} is not a valid semantic version")))
            }
            Some(_) => {}
        }

        if csv.replaces.as_deref() == Some(csv.name.as_str()) {
            messages.push(self.error(format!("spec.replaces references the CSV itself ({})", csv.name)));
        }
        if csv.skips.iter().any(|s| s == &csv.name) {
            messages.push(self.warning(format!("spec.skips contains the CSV itself ({})", csv.name)));
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::manifest_parser::CsvManifest;
    use ocaudit_common::models::MessageLevel;
    use serde_json::json;

    fn manifest(name: &str, version: Option<&str>, replaces: Option<&str>) -> BundleManifest {
        BundleManifest {
            csv: CsvManifest {
                name: name.to_string(),
                version: version.map(str::to_string),
                replaces: replaces.map(str::to_string),
                raw: json!({"kind": "ClusterServiceVersion"}),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_csv() {
        let messages = CsvValidator
            .validate(&manifest("etcd.v0.9.4", Some("0.9.4"), Some("etcd.v0.9.2")))
            .unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_bad_version_and_self_replace() {
        let messages = CsvValidator
            .validate(&manifest("etcd.v1", Some("v1"), Some("etcd.v1")))
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.level == MessageLevel::Error));
    }

    #[test]
    fn test_missing_version() {
        let messages = CsvValidator.validate(&manifest("etcd.v1", None, None)).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].message.contains("spec.version"));
    }

    #[test]
    fn test_non_object_document_cannot_be_validated() {
        let mut m = manifest("etcd.v1", Some("1.0.0"), None);
        m.csv.raw = serde_json::Value::Null;
        assert!(CsvValidator.validate(&m).is_err());
    }
}

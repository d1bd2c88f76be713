//! Deprecation pattern table
//!
//! Maps validator message shapes to deprecated API kinds. The model builder
//! runs every validator message of a bundle through the table; the kinds of
//! all matching entries form the bundle's deprecated API kind set.
//!
//! The built-in table matches the message shape of the removed-API validator.
//! `AuditConfig::deprecation_patterns` replaces it entirely when set.

use crate::error::{AuditError, AuditResult};
use ocaudit_common::config::DeprecationPattern;
use ocaudit_common::models::ValidatorMessage;
use ocaudit_common::AuditConfig;
use regex::Regex;
use std::collections::BTreeSet;

/// Built-in `(pattern, kind)` entries
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    (r"removed in v1\.22.*Migrate the API\(s\) for CustomResourceDefinition:", "CustomResourceDefinition"),
    (r"removed in v1\.22.*Migrate the API\(s\) for CRD:", "CustomResourceDefinition"),
    (r"removed in v1\.22.*Migrate the API\(s\) for MutatingWebhookConfiguration:", "MutatingWebhookConfiguration"),
    (r"removed in v1\.22.*Migrate the API\(s\) for ValidatingWebhookConfiguration:", "ValidatingWebhookConfiguration"),
    (r"removed in v1\.22.*Migrate the API\(s\) for APIService:", "APIService"),
    (r"removed in v1\.22.*Migrate the API\(s\) for TokenReview:", "TokenReview"),
    (r"removed in v1\.22.*Migrate the API\(s\) for (Local|Self)?SubjectAccessReview:", "SubjectAccessReview"),
    (r"removed in v1\.22.*Migrate the API\(s\) for CertificateSigningRequest:", "CertificateSigningRequest"),
    (r"removed in v1\.22.*Migrate the API\(s\) for Lease:", "Lease"),
    (r"removed in v1\.22.*Migrate the API\(s\) for Ingress:", "Ingress"),
    (r"removed in v1\.22.*Migrate the API\(s\) for IngressClass:", "IngressClass"),
    (r"removed in v1\.22.*Migrate the API\(s\) for (Cluster)?Role(Binding)?:", "RBAC"),
    (r"removed in v1\.22.*Migrate the API\(s\) for PriorityClass:", "PriorityClass"),
    (r"removed in v1\.22.*Migrate the API\(s\) for (CSIDriver|CSINode|StorageClass|VolumeAttachment):", "Storage"),
];

/// Compiled pattern table
#[derive(Debug, Clone)]
pub struct DeprecationPatternTable {
    entries: Vec<(Regex, String)>,
}

impl DeprecationPatternTable {
    /// Compile `(pattern, kind)` entries
    pub fn new(patterns: &[DeprecationPattern]) -> AuditResult<Self> {
        let entries = patterns
            .iter()
            .map(|p| {
                Regex::new(&p.pattern)
                    .map(|re| (re, p.kind.clone()))
                    .map_err(|e| {
                        AuditError::Config(format!("invalid deprecation pattern {:?}: {}", p.pattern, e))
                    })
            })
            .collect::<AuditResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// The configured override, or the built-in table
    pub fn from_config(config: &AuditConfig) -> AuditResult<Self> {
        match &config.deprecation_patterns {
            Some(patterns) => Self::new(patterns),
            None => Self::new(&default_patterns()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kinds whose patterns match `message`
    pub fn kinds_in<'a>(&'a self, message: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(re, _)| re.is_match(message))
            .map(|(_, kind)| kind.as_str())
    }

    /// Union of the kinds found across `messages`
    pub fn kinds_for(&self, messages: &[ValidatorMessage]) -> BTreeSet<String> {
        messages
            .iter()
            .flat_map(|m| self.kinds_in(&m.message))
            .map(str::to_string)
            .collect()
    }
}

impl Default for DeprecationPatternTable {
    fn default() -> Self {
        let entries = DEFAULT_PATTERNS
            .iter()
            .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, kind.to_string())))
            .collect();
        Self { entries }
    }
}

/// Built-in table as configuration values
pub fn default_patterns() -> Vec<DeprecationPattern> {
    DEFAULT_PATTERNS
        .iter()
        .map(|(pattern, kind)| DeprecationPattern {
            pattern: pattern.to_string(),
            kind: kind.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::deprecated_api_validator::removal_message;
    use ocaudit_common::models::MessageLevel;

    fn message(text: String) -> ValidatorMessage {
        ValidatorMessage {
            validator: "deprecated-api".to_string(),
            level: MessageLevel::Warning,
            message: text,
        }
    }

    #[test]
    fn test_default_table_compiles() {
        let table = DeprecationPatternTable::default();
        assert_eq!(table.len(), DEFAULT_PATTERNS.len());
    }

    #[test]
    fn test_kinds_from_validator_messages() {
        let table = DeprecationPatternTable::default();
        let messages = vec![
            message(removal_message("CustomResourceDefinition", ["a.example.com"])),
            message(removal_message("Ingress", ["web"])),
            message(removal_message("ClusterRoleBinding", ["admin"])),
            message("csv.Spec.Description not specified".to_string()),
        ];
        let kinds: Vec<String> = table.kinds_for(&messages).into_iter().collect();
        assert_eq!(kinds, vec!["CustomResourceDefinition", "Ingress", "RBAC"]);
    }

    #[test]
    fn test_ingress_pattern_does_not_match_ingress_class() {
        let table = DeprecationPatternTable::default();
        let kinds = table.kinds_for(&[message(removal_message("IngressClass", ["nginx"]))]);
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec!["IngressClass"]);
    }

    #[test]
    fn test_config_override_replaces_table() {
        let config = AuditConfig {
            deprecation_patterns: Some(vec![DeprecationPattern {
                pattern: "(?i)uses extensions/v1beta1".to_string(),
                kind: "Ingress".to_string(),
            }]),
            ..Default::default()
        };
        let table = DeprecationPatternTable::from_config(&config).unwrap();
        assert_eq!(table.len(), 1);
        let kinds = table.kinds_for(&[
            message("Object web USES extensions/v1beta1".to_string()),
            message(removal_message("CustomResourceDefinition", ["a"])),
        ]);
        assert_eq!(kinds.into_iter().collect::<Vec<_>>(), vec!["Ingress"]);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let err = DeprecationPatternTable::new(&[DeprecationPattern {
            pattern: "(".to_string(),
            kind: "X".to_string(),
        }])
        .unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }
}

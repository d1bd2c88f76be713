//! Kubernetes 1.22 removed-API validator
//!
//! Flags bundle objects whose `apiVersion`/`kind` pair was removed in
//! Kubernetes 1.22 (OpenShift 4.9). One warning is emitted per kind, naming
//! every offending object of that kind:
//!
//! ```text
//! this bundle is using APIs which were deprecated and removed in v1.22.
//! More info: https://kubernetes.io/docs/reference/using-api/deprecation-guide/#v1-22.
//! Migrate the API(s) for CustomResourceDefinition: (["a.example.com"])
//! ```
//!
//! The message shape is what the deprecation pattern table matches on.

use super::{BundleValidator, ValidatorError};
use crate::services::manifest_parser::BundleManifest;
use ocaudit_common::models::ValidatorMessage;
use std::collections::{BTreeMap, BTreeSet};

pub const VALIDATOR_NAME: &str = "deprecated-api";

pub const REMOVAL_MESSAGE_PREFIX: &str = "this bundle is using APIs which were deprecated and removed in v1.22. \
     More info: https://kubernetes.io/docs/reference/using-api/deprecation-guide/#v1-22.";

/// `(apiVersion, kind)` pairs no longer served as of Kubernetes 1.22
pub const REMOVED_IN_1_22: &[(&str, &str)] = &[
    ("admissionregistration.k8s.io/v1beta1", "MutatingWebhookConfiguration"),
    ("admissionregistration.k8s.io/v1beta1", "ValidatingWebhookConfiguration"),
    ("apiextensions.k8s.io/v1beta1", "CustomResourceDefinition"),
    ("apiregistration.k8s.io/v1beta1", "APIService"),
    ("authentication.k8s.io/v1beta1", "TokenReview"),
    ("authorization.k8s.io/v1beta1", "LocalSubjectAccessReview"),
    ("authorization.k8s.io/v1beta1", "SelfSubjectAccessReview"),
    ("authorization.k8s.io/v1beta1", "SubjectAccessReview"),
    ("certificates.k8s.io/v1beta1", "CertificateSigningRequest"),
    ("coordination.k8s.io/v1beta1", "Lease"),
    ("extensions/v1beta1", "Ingress"),
    ("networking.k8s.io/v1beta1", "Ingress"),
    ("networking.k8s.io/v1beta1", "IngressClass"),
    ("rbac.authorization.k8s.io/v1beta1", "ClusterRole"),
    ("rbac.authorization.k8s.io/v1beta1", "ClusterRoleBinding"),
    ("rbac.authorization.k8s.io/v1beta1", "Role"),
    ("rbac.authorization.k8s.io/v1beta1", "RoleBinding"),
    ("scheduling.k8s.io/v1beta1", "PriorityClass"),
    ("storage.k8s.io/v1beta1", "CSIDriver"),
    ("storage.k8s.io/v1beta1", "CSINode"),
    ("storage.k8s.io/v1beta1", "StorageClass"),
    ("storage.k8s.io/v1beta1", "VolumeAttachment"),
];

/// True when `api_version`/`kind` is no longer served in Kubernetes 1.22
pub fn is_removed_api(api_version: &str, kind: &str) -> bool {
    REMOVED_IN_1_22
        .iter()
        .any(|(v, k)| *v == api_version && *k == kind)
}

/// Warning text for one kind and its offending object names
pub fn removal_message<'a>(kind: &str, names: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = names.into_iter().map(|n| format!("{n:?}")).collect();
    format!(
        "{} Migrate the API(s) for {}: ([{}])",
        REMOVAL_MESSAGE_PREFIX,
        kind,
        quoted.join(",")
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeprecatedApiValidator;

impl BundleValidator for DeprecatedApiValidator {
    fn name(&self) -> &'static str {
        VALIDATOR_NAME
    }

    fn validate(&self, manifest: &BundleManifest) -> Result<Vec<ValidatorMessage>, ValidatorError> {
        let mut by_kind: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for object in &manifest.objects {
            if is_removed_api(&object.api_version, &object.kind) {
                by_kind
                    .entry(object.kind.as_str())
                    .or_default()
                    .insert(object.name.as_str());
            }
        }

        Ok(by_kind
            .into_iter()
            .map(|(kind, names)| self.warning(removal_message(kind, names)))
            .collect())
    }
}

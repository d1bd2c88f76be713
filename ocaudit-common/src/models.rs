//! Canonical audit model
//!
//! One [`Package`] per catalog package, carrying its channels and one
//! [`Bundle`] record per audited bundle. Field names and nesting are
//! serialized in camelCase and must stay stable across runs, since downstream
//! report tooling reads them directly.
//!
//! # Lifecycle
//! - The catalog adapter creates bundles with catalog facts only (name, image,
//!   properties, channel membership)
//! - The enrichment pool adds manifest, validator and conformance facts
//! - The model builder resolves version lineage and deprecated API kinds
//! - The classifier only reads

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque `(type, value)` property pair attached to a bundle
///
/// Catalogs store properties as a flat multimap; the audit keeps them as-is
/// and only interprets the few types it knows about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub property_type: String,
    pub value: String,
}

impl Property {
    pub fn new(property_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property_type: property_type.into(),
            value: value.into(),
        }
    }
}

/// Well-known property types
pub mod property_types {
    pub const PACKAGE: &str = "olm.package";
    pub const DEPRECATED: &str = "olm.deprecated";
    pub const MAX_OPENSHIFT_VERSION: &str = "olm.maxOpenShiftVersion";
}

/// Enrichment stage a per-bundle error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStage {
    /// Pulling the bundle artifact
    Fetch,
    /// Copying manifests into the scratch directory
    Extract,
    /// Parsing the manifest set
    Parse,
    /// Running static validators
    Validate,
    /// Running the conformance test suite
    Conformance,
    /// Per-bundle time budget exhausted
    Timeout,
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditStage::Fetch => "fetch",
            AuditStage::Extract => "extract",
            AuditStage::Parse => "parse",
            AuditStage::Validate => "validate",
            AuditStage::Conformance => "conformance",
            AuditStage::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Non-fatal error recorded on a bundle during enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleError {
    pub stage: AuditStage,
    pub message: String,
}

impl BundleError {
    pub fn new(stage: AuditStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

/// Severity of a validator finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Warning,
    Error,
}

/// Single finding produced by a static validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMessage {
    pub validator: String,
    pub level: MessageLevel,
    pub message: String,
}

/// Outcome of one conformance test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConformanceState {
    Pass,
    Fail,
    Error,
}

/// One conformance test result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceResult {
    pub name: String,
    pub state: ConformanceState,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Declared bundle version after enrichment
///
/// Exactly one of the two states holds for every audited bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeclaredVersion {
    /// Declared and a valid semantic version
    Valid { value: String },
    /// Missing or malformed; `raw` holds whatever was declared
    Unparseable { raw: String },
}

impl DeclaredVersion {
    /// Classify a raw declared version string
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if crate::version::is_valid_semver(v) => DeclaredVersion::Valid {
                value: v.to_string(),
            },
            Some(v) => DeclaredVersion::Unparseable { raw: v.to_string() },
            None => DeclaredVersion::Unparseable { raw: String::new() },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, DeclaredVersion::Valid { .. })
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeclaredVersion::Valid { value } => value,
            DeclaredVersion::Unparseable { raw } => raw,
        }
    }
}

impl Default for DeclaredVersion {
    fn default() -> Self {
        DeclaredVersion::Unparseable { raw: String::new() }
    }
}

/// Bundle record: one installable release of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Unique bundle name within the catalog snapshot
    pub name: String,
    /// Owning package; empty when the catalog has no membership for the bundle
    pub package_name: String,
    /// Artifact reference handed to the artifact fetcher
    pub image: String,
    /// Channels this bundle is an entry of
    pub channels: BTreeSet<String>,
    /// Default channel of the owning package
    pub default_channel: String,
    /// True when the bundle is the head of at least one channel
    pub is_head_of_channel: bool,
    pub version: DeclaredVersion,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub skip_range: Option<String>,
    /// Catalog properties, preserved as opaque pairs
    pub properties: Vec<Property>,
    /// True when the catalog marks the bundle deprecated
    pub is_deprecated: bool,
    /// `olm.maxOpenShiftVersion` declared by the bundle
    pub max_ocp_version: Option<String>,
    /// `com.redhat.openshift.versions` annotation value
    pub ocp_label: Option<String>,
    /// Architectures declared as supported via CSV labels
    pub architectures: Vec<String>,
    /// Tool that generated the bundle (builder annotation)
    pub builder: Option<String>,
    /// Infrastructure features annotation, raw
    pub infrastructure_features: Option<String>,
    pub deprecated_api_kinds: BTreeSet<String>,
    pub validator_messages: Vec<ValidatorMessage>,
    pub conformance_results: Option<Vec<ConformanceResult>>,
    pub errors: Vec<BundleError>,
    /// Excluded by the artifact label filter
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub filtered_out: bool,
}

impl Bundle {
    /// New bundle as created by the catalog adapter
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Zero deprecated API kinds
    pub fn is_migrated(&self) -> bool {
        self.deprecated_api_kinds.is_empty()
    }

    /// Record a non-fatal error
    pub fn push_error(&mut self, stage: AuditStage, message: impl Into<String>) {
        self.errors.push(BundleError::new(stage, message));
    }

    pub fn errors_in(&self, stage: AuditStage) -> impl Iterator<Item = &BundleError> {
        self.errors.iter().filter(move |e| e.stage == stage)
    }

    /// First property value of the given type
    pub fn property(&self, property_type: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.property_type == property_type)
            .map(|p| p.value.as_str())
    }

    pub fn has_validator_errors(&self) -> bool {
        self.validator_messages
            .iter()
            .any(|m| m.level == MessageLevel::Error)
    }

    pub fn has_validator_warnings(&self) -> bool {
        self.validator_messages
            .iter()
            .any(|m| m.level == MessageLevel::Warning)
    }
}

/// Named upgrade track within a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub package_name: String,
    pub head_bundle: Option<String>,
}

/// Installable product; the unit of compliance classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub name: String,
    pub default_channel: String,
    pub channels: Vec<Channel>,
    pub bundles: Vec<Bundle>,
}

impl Package {
    pub fn new(name: impl Into<String>, default_channel: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_channel: default_channel.into(),
            ..Default::default()
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Bundles advertised as head of at least one channel
    pub fn head_bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.iter().filter(|b| b.is_head_of_channel)
    }
}

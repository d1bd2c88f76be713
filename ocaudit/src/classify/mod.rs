//! Compliance classifier
//!
//! Partitions packages into three tiers by deprecated API usage:
//!
//! | Tier | Rule |
//! |------|------|
//! | Complying | every bundle migrated, or a migrated head bundle that is not deprecated |
//! | Not complying | no bundle migrated, and either no bundle mitigated or every unmigrated bundle mitigated |
//! | Partially complying | everything else |
//!
//! A bundle is *migrated* when it uses no deprecated API kinds and
//! *mitigated* when its platform metadata pins it below the release that
//! removed those APIs (see [`ocaudit_common::platform`]).
//!
//! Packages are grouped by name; bundle arrival order never matters. Output
//! maps are `BTreeMap`s and every list is sorted, so classifying the same
//! model twice serializes identically.

pub mod grade;
pub mod patterns;

use ocaudit_common::models::{Bundle, Package};
use ocaudit_common::platform::{is_mitigated, SupportedRange};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

pub use grade::{grade_package, GradeContext, PackageGrade};
pub use patterns::DeprecationPatternTable;

/// Compliance tier of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComplianceTier {
    Complying,
    PartiallyComplying,
    NotComplying,
}

impl fmt::Display for ComplianceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComplianceTier::Complying => "complying",
            ComplianceTier::PartiallyComplying => "partially complying",
            ComplianceTier::NotComplying => "not complying",
        };
        f.write_str(name)
    }
}

/// Per-package aggregate recorded under its tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCompliance {
    pub package_name: String,
    pub default_channel: String,
    /// Union of deprecated API kinds across the package's bundles
    pub deprecated_api_kinds: BTreeSet<String>,
    /// Union of channel names across the package's bundles
    pub channels: BTreeSet<String>,
    /// Bundle tokens with no deprecated API kinds, sorted
    pub migrated_bundles: Vec<String>,
    /// Bundle tokens with deprecated API kinds, sorted
    pub unmigrated_bundles: Vec<String>,
}

/// The three classification maps, keyed by package name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub complying: BTreeMap<String, PackageCompliance>,
    pub partially_complying: BTreeMap<String, PackageCompliance>,
    pub not_complying: BTreeMap<String, PackageCompliance>,
}

impl Classification {
    pub fn tier_of(&self, package: &str) -> Option<ComplianceTier> {
        if self.complying.contains_key(package) {
            Some(ComplianceTier::Complying)
        } else if self.partially_complying.contains_key(package) {
            Some(ComplianceTier::PartiallyComplying)
        } else if self.not_complying.contains_key(package) {
            Some(ComplianceTier::NotComplying)
        } else {
            None
        }
    }

    pub fn tier_map(&self, tier: ComplianceTier) -> &BTreeMap<String, PackageCompliance> {
        match tier {
            ComplianceTier::Complying => &self.complying,
            ComplianceTier::PartiallyComplying => &self.partially_complying,
            ComplianceTier::NotComplying => &self.not_complying,
        }
    }

    fn tier_map_mut(&mut self, tier: ComplianceTier) -> &mut BTreeMap<String, PackageCompliance> {
        match tier {
            ComplianceTier::Complying => &mut self.complying,
            ComplianceTier::PartiallyComplying => &mut self.partially_complying,
            ComplianceTier::NotComplying => &mut self.not_complying,
        }
    }

    pub fn len(&self) -> usize {
        self.complying.len() + self.partially_complying.len() + self.not_complying.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bundle carries a mitigation signal
pub fn bundle_is_mitigated(bundle: &Bundle) -> bool {
    is_mitigated(bundle.max_ocp_version.as_deref(), bundle.ocp_label.as_deref())
}

/// Tier for one package's bundle set
pub fn tier_for(bundles: &[&Bundle]) -> ComplianceTier {
    if bundles.is_empty() {
        return ComplianceTier::NotComplying;
    }

    let all_migrated = bundles.iter().all(|b| b.is_migrated());
    let migrated_head = bundles
        .iter()
        .any(|b| b.is_head_of_channel && b.is_migrated() && !b.is_deprecated);
    if all_migrated || migrated_head {
        return ComplianceTier::Complying;
    }

    let any_migrated = bundles.iter().any(|b| b.is_migrated());
    if any_migrated {
        return ComplianceTier::PartiallyComplying;
    }

    // Nothing migrated: mixed mitigation is partial, uniform mitigation is not
    let mitigated = bundles.iter().filter(|b| bundle_is_mitigated(b)).count();
    if mitigated == 0 || mitigated == bundles.len() {
        ComplianceTier::NotComplying
    } else {
        ComplianceTier::PartiallyComplying
    }
}

/// Stable, human-readable description of a bundle
///
/// `name - (label=<label>,range=<range>,channels=[a,b],head:YES|NO)`
pub fn bundle_token(bundle: &Bundle) -> String {
    let range = SupportedRange::from_metadata(
        bundle.ocp_label.as_deref(),
        bundle.max_ocp_version.as_deref(),
    );
    let channels: Vec<&str> = bundle.channels.iter().map(String::as_str).collect();
    format!(
        "{} - (label={},range={},channels=[{}],head:{})",
        bundle.name,
        bundle.ocp_label.as_deref().unwrap_or("none"),
        range,
        channels.join(","),
        if bundle.is_head_of_channel { "YES" } else { "NO" }
    )
}

/// Classify every named package
///
/// Packages sharing a name are merged. Packages with an empty name are
/// skipped.
pub fn classify(packages: &[Package]) -> Classification {
    let mut grouped: BTreeMap<&str, (Vec<&Bundle>, &str)> = BTreeMap::new();
    for package in packages {
        if package.name.trim().is_empty() {
            debug!(bundles = package.bundles.len(), "Skipping bundles with no package name");
            continue;
        }
        let entry = grouped
            .entry(package.name.as_str())
            .or_insert_with(|| (Vec::new(), package.default_channel.as_str()));
        entry.0.extend(package.bundles.iter());
        if entry.1.is_empty() {
            entry.1 = package.default_channel.as_str();
        }
    }

    let mut classification = Classification::default();
    for (name, (bundles, default_channel)) in grouped {
        let tier = tier_for(&bundles);
        let aggregate = aggregate(name, default_channel, &bundles);
        debug!(package = name, %tier, "Package classified");
        classification
            .tier_map_mut(tier)
            .insert(name.to_string(), aggregate);
    }

    info!(
        complying = classification.complying.len(),
        partially_complying = classification.partially_complying.len(),
        not_complying = classification.not_complying.len(),
        "Packages classified"
    );
    classification
}

fn aggregate(name: &str, default_channel: &str, bundles: &[&Bundle]) -> PackageCompliance {
    let mut result = PackageCompliance {
        package_name: name.to_string(),
        default_channel: default_channel.to_string(),
        ..Default::default()
    };

    for bundle in bundles {
        result
            .deprecated_api_kinds
            .extend(bundle.deprecated_api_kinds.iter().cloned());
        result.channels.extend(bundle.channels.iter().cloned());
        if bundle.is_migrated() {
            result.migrated_bundles.push(bundle_token(bundle));
        } else {
            result.unmigrated_bundles.push(bundle_token(bundle));
        }
    }
    result.migrated_bundles.sort();
    result.unmigrated_bundles.sort();
    result
}

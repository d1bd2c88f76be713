//! Canonical audit model builder
//!
//! Joins the catalog snapshot with the enriched bundle records:
//!
//! - Catalog graph facts (channels, default channel, head flag) always come
//!   from the snapshot
//! - Version, replaces and skips prefer the parsed manifest over the catalog
//! - Deprecated API kinds come from the bundle's validator messages run
//!   through the deprecation pattern table
//! - Bundles excluded by the label filter are dropped
//!
//! Bundles with no catalog package are re-homed by the package name in their
//! manifest. A bundle that still has no package stays in the model as
//! unassigned and is never classified.

use crate::catalog::CatalogSnapshot;
use crate::classify::patterns::DeprecationPatternTable;
use crate::workflow::enrichment::{EnrichedBundle, ManifestFacts};
use ocaudit_common::models::{property_types, Bundle, DeclaredVersion, Package};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Fully materialized canonical model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditModel {
    /// Packages in name order, bundles in name order within each
    pub packages: Vec<Package>,
    /// Bundles with no known package, in name order
    pub unassigned_bundles: Vec<Bundle>,
    /// Bundles dropped by the artifact label filter
    pub filtered_out: usize,
}

impl AuditModel {
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.packages
            .iter()
            .flat_map(|p| p.bundles.iter())
            .chain(self.unassigned_bundles.iter())
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles().count()
    }
}

/// Merge the snapshot with enrichment results
pub fn build(
    snapshot: CatalogSnapshot,
    enriched: Vec<EnrichedBundle>,
    patterns: &DeprecationPatternTable,
) -> AuditModel {
    let mut by_name: HashMap<String, EnrichedBundle> = enriched
        .into_iter()
        .map(|e| (e.bundle.name.clone(), e))
        .collect();

    let mut model = AuditModel::default();
    let mut packages: BTreeMap<String, Package> = BTreeMap::new();

    for mut package in snapshot.packages {
        let catalog_bundles = std::mem::take(&mut package.bundles);
        for catalog_bundle in catalog_bundles {
            let enriched = by_name.remove(&catalog_bundle.name);
            if let Some(bundle) = merge(catalog_bundle, enriched, patterns, &mut model.filtered_out) {
                package.bundles.push(bundle);
            }
        }
        packages.insert(package.name.clone(), package);
    }

    for catalog_bundle in snapshot.unowned_bundles {
        let enriched = by_name.remove(&catalog_bundle.name);
        let Some(mut bundle) = merge(catalog_bundle, enriched, patterns, &mut model.filtered_out) else {
            continue;
        };
        if bundle.package_name.is_empty() {
            model.unassigned_bundles.push(bundle);
            continue;
        }
        let package = packages
            .entry(bundle.package_name.clone())
            .or_insert_with(|| Package::new(bundle.package_name.clone(), ""));
        bundle.default_channel = package.default_channel.clone();
        debug!(bundle = %bundle.name, package = %package.name, "Re-homed bundle by manifest package name");
        package.bundles.push(bundle);
    }

    for name in by_name.keys() {
        warn!(bundle = %name, "Enriched bundle is not part of the catalog snapshot; ignoring");
    }

    model.packages = packages
        .into_values()
        .filter(|p| !p.bundles.is_empty())
        .map(finish_package)
        .collect();
    model.unassigned_bundles.sort_by(|a, b| a.name.cmp(&b.name));

    info!(
        packages = model.packages.len(),
        bundles = model.bundle_count(),
        unassigned = model.unassigned_bundles.len(),
        filtered_out = model.filtered_out,
        "Audit model built"
    );
    model
}

/// Merge one catalog bundle with its enrichment; `None` when filtered out
fn merge(
    catalog: Bundle,
    enriched: Option<EnrichedBundle>,
    patterns: &DeprecationPatternTable,
    filtered_out: &mut usize,
) -> Option<Bundle> {
    let (mut bundle, facts) = match enriched {
        Some(EnrichedBundle { bundle, manifest }) => (bundle, manifest),
        None => {
            debug!(bundle = %catalog.name, "No enrichment result; keeping catalog facts only");
            (catalog.clone(), None)
        }
    };

    if bundle.filtered_out {
        *filtered_out += 1;
        return None;
    }

    // Graph facts belong to the catalog
    bundle.channels = catalog.channels;
    bundle.default_channel = catalog.default_channel;
    bundle.is_head_of_channel = catalog.is_head_of_channel;
    if !catalog.package_name.is_empty() {
        bundle.package_name = catalog.package_name;
    }

    if let Some(facts) = facts {
        apply_manifest_facts(&mut bundle, facts);
    }

    bundle.deprecated_api_kinds = patterns.kinds_for(&bundle.validator_messages);

    if bundle.is_head_of_channel && bundle.channels.is_empty() {
        warn!(bundle = %bundle.name, "Head-of-channel bundle belongs to no channel; clearing head flag");
        bundle.is_head_of_channel = false;
    }
    Some(bundle)
}

fn apply_manifest_facts(bundle: &mut Bundle, facts: ManifestFacts) {
    if bundle.package_name.is_empty() {
        if let Some(package) = facts.package_name {
            bundle.package_name = package;
        }
    }

    if let Some(version) = facts.version.filter(|v| !v.trim().is_empty()) {
        bundle.version = DeclaredVersion::from_raw(Some(&version));
    }
    if facts.replaces.is_some() {
        bundle.replaces = facts.replaces;
    }
    if !facts.skips.is_empty() {
        bundle.skips = facts.skips;
    }

    // A catalog property wins over the CSV annotation
    if bundle.property(property_types::MAX_OPENSHIFT_VERSION).is_none() {
        if let Some(max) = facts.max_ocp_version {
            bundle.max_ocp_version = Some(max);
        }
    }
    bundle.ocp_label = facts.ocp_label;
    bundle.architectures = facts.architectures;
    bundle.builder = facts.builder;
    bundle.infrastructure_features = facts.infrastructure_features;
}

/// Restore ordering and drop channel heads that are not among the bundles
fn finish_package(mut package: Package) -> Package {
    package.bundles.sort_by(|a, b| a.name.cmp(&b.name));
    for channel in &mut package.channels {
        let head_present = channel
            .head_bundle
            .as_ref()
            .map(|head| package.bundles.iter().any(|b| &b.name == head))
            .unwrap_or(true);
        if !head_present {
            debug!(
                package = %package.name,
                channel = %channel.name,
                "Channel head is outside the audited bundle set; clearing"
            );
            channel.head_bundle = None;
        }
    }
    package
}

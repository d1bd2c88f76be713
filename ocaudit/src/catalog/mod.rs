//! Catalog source adapter
//!
//! Reads an operator catalog in either of its two representations and
//! normalizes it into a [`CatalogSnapshot`]: packages with their channels and
//! one catalog-only [`Bundle`] record per bundle.
//!
//! # Format detection
//! The location is checked for a non-empty declarative document tree, either the
//! location itself or its `configs/` subdirectory (index image layout). When no
//! tree is found the location is opened as a relational store: the location
//! itself when it is a file, or `database/index.db` beneath it.
//!
//! Nothing past this module knows which format a catalog came from.

pub mod declarative;
pub mod relational;

use crate::error::{AuditError, AuditResult};
use ocaudit_common::models::{property_types, Bundle, DeclaredVersion, Package};
use ocaudit_common::AuditConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub use declarative::DeclarativeCatalog;
pub use relational::RelationalCatalog;

/// Catalog representation detected at a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    Relational,
    Declarative,
}

/// Opened catalog, one variant per representation
#[derive(Debug)]
pub enum CatalogSource {
    Relational(RelationalCatalog),
    Declarative(DeclarativeCatalog),
}

/// Normalized catalog contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    /// Packages in name order, bundles in name order within each package
    pub packages: Vec<Package>,
    /// Bundles with no recorded package membership
    pub unowned_bundles: Vec<Bundle>,
}

impl CatalogSnapshot {
    pub fn bundle_count(&self) -> usize {
        self.packages.iter().map(|p| p.bundles.len()).sum::<usize>() + self.unowned_bundles.len()
    }

    /// Every bundle, owned ones first
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.packages
            .iter()
            .flat_map(|p| p.bundles.iter())
            .chain(self.unowned_bundles.iter())
    }
}

impl IntoIterator for CatalogSnapshot {
    type Item = Package;
    type IntoIter = std::vec::IntoIter<Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.into_iter()
    }
}

impl CatalogSource {
    /// Detect the format at `location` and open the catalog it holds
    pub async fn open(location: &Path) -> AuditResult<Self> {
        if !location.exists() {
            return Err(AuditError::catalog(location, "location does not exist"));
        }

        if let Some(root) = find_declarative_root(location) {
            info!(root = %root.display(), "Opening declarative catalog");
            let catalog = DeclarativeCatalog::load(&root)?;
            return Ok(CatalogSource::Declarative(catalog));
        }

        let db_path = relational_path(location).ok_or_else(|| {
            AuditError::catalog(
                location,
                "no declarative documents and no relational database found",
            )
        })?;
        info!(database = %db_path.display(), "Opening relational catalog");
        let catalog = RelationalCatalog::open(&db_path).await?;
        Ok(CatalogSource::Relational(catalog))
    }

    pub fn format(&self) -> CatalogFormat {
        match self {
            CatalogSource::Relational(_) => CatalogFormat::Relational,
            CatalogSource::Declarative(_) => CatalogFormat::Declarative,
        }
    }

    /// Read the catalog into a snapshot scoped by the configured filter and limit
    pub async fn load(&self, config: &AuditConfig) -> AuditResult<CatalogSnapshot> {
        let snapshot = match self {
            CatalogSource::Relational(catalog) => {
                catalog.read_snapshot(config.package_filter()).await?
            }
            CatalogSource::Declarative(catalog) => catalog.snapshot(config.package_filter()),
        };

        let snapshot = apply_limit(snapshot, config.bundle_limit());
        info!(
            format = ?self.format(),
            packages = snapshot.packages.len(),
            bundles = snapshot.bundle_count(),
            "Catalog loaded"
        );
        Ok(snapshot)
    }
}

/// Declarative tree root at `location`, if one exists and holds documents
pub fn find_declarative_root(location: &Path) -> Option<PathBuf> {
    if !location.is_dir() {
        return None;
    }
    let configs = location.join("configs");
    if configs.is_dir() && contains_documents(&configs) {
        return Some(configs);
    }
    contains_documents(location).then(|| location.to_path_buf())
}

fn relational_path(location: &Path) -> Option<PathBuf> {
    if location.is_file() {
        return Some(location.to_path_buf());
    }
    let candidate = location.join("database").join("index.db");
    candidate.is_file().then_some(candidate)
}

/// True for files the declarative loader reads
pub(crate) fn is_document(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("yaml") | Some("yml")
    )
}

fn contains_documents(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file() && is_document(e.path()) && !is_empty_file(e.path()))
}

fn is_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

/// Fill the catalog-derived bundle fields both variants share
///
/// `stored_version` is the version column or channel-level version, if any;
/// otherwise the `olm.package` property supplies it.
pub(crate) fn finish_catalog_bundle(bundle: &mut Bundle, stored_version: Option<&str>) {
    let property_version = bundle
        .property(property_types::PACKAGE)
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|v| v.get("version").and_then(|v| v.as_str()).map(str::to_string));

    let version = stored_version
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or(property_version);
    bundle.version = DeclaredVersion::from_raw(version.as_deref());

    bundle.is_deprecated = bundle.property(property_types::DEPRECATED).is_some();
    bundle.max_ocp_version = bundle
        .property(property_types::MAX_OPENSHIFT_VERSION)
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty());
}

/// Order a package's contents and enforce the default channel invariant
pub(crate) fn check_package(mut package: Package) -> Package {
    package.channels.sort_by(|a, b| a.name.cmp(&b.name));
    package.bundles.sort_by(|a, b| a.name.cmp(&b.name));

    if !package.default_channel.is_empty() && package.channel(&package.default_channel).is_none() {
        warn!(
            package = %package.name,
            default_channel = %package.default_channel,
            "Default channel is not one of the package's channels; clearing"
        );
        package.default_channel.clear();
        for bundle in &mut package.bundles {
            bundle.default_channel.clear();
        }
    }
    package
}

/// Cap the number of bundles, keeping package order and dropping emptied packages
///
/// Unowned bundles are counted after every owned bundle.
pub(crate) fn apply_limit(mut snapshot: CatalogSnapshot, limit: Option<usize>) -> CatalogSnapshot {
    let Some(mut remaining) = limit else {
        return snapshot;
    };

    for package in &mut snapshot.packages {
        let keep = package.bundles.len().min(remaining);
        package.bundles.truncate(keep);
        remaining -= keep;
    }
    snapshot.packages.retain(|p| !p.bundles.is_empty());
    snapshot.unowned_bundles.truncate(remaining);
    snapshot
}

//! Declarative catalog variant
//!
//! Loads a tree of JSON/YAML documents (one or more documents per file) into
//! an in-memory package → channel → bundle graph. Documents are dispatched on
//! their `schema` field:
//!
//! - `olm.package`      → package name and default channel
//! - `olm.channel`      → channel entries with `replaces`/`skips`/`skipRange`
//! - `olm.bundle`       → bundle image and properties
//! - `olm.deprecations` → bundles marked deprecated
//!
//! Unknown schemas are ignored. The head of a channel is the single entry that
//! no other entry of the same channel replaces or skips.

use super::{check_package, finish_catalog_bundle, is_document, CatalogSnapshot};
use crate::error::{AuditError, AuditResult};
use ocaudit_common::models::{Bundle, Channel, Package, Property};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageDoc {
    name: String,
    #[serde(default)]
    default_channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelEntryDoc {
    name: String,
    #[serde(default)]
    replaces: Option<String>,
    #[serde(default)]
    skips: Vec<String>,
    #[serde(default)]
    skip_range: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChannelDoc {
    name: String,
    package: String,
    #[serde(default)]
    entries: Vec<ChannelEntryDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct PropertyDoc {
    #[serde(rename = "type")]
    property_type: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct BundleDoc {
    name: String,
    #[serde(default)]
    package: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    properties: Vec<PropertyDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeprecationReference {
    schema: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeprecationEntryDoc {
    reference: DeprecationReference,
}

#[derive(Debug, Clone, Deserialize)]
struct DeprecationsDoc {
    #[serde(default)]
    entries: Vec<DeprecationEntryDoc>,
}

/// Loaded declarative catalog
#[derive(Debug, Clone, Default)]
pub struct DeclarativeCatalog {
    root: PathBuf,
    packages: BTreeMap<String, PackageDoc>,
    channels: Vec<ChannelDoc>,
    bundles: BTreeMap<String, BundleDoc>,
    deprecated: HashSet<String>,
    /// `(package, channel)` → head bundle
    heads: BTreeMap<(String, String), String>,
}

impl DeclarativeCatalog {
    /// Parse every document under `root` and validate the resulting graph
    pub fn load(root: &Path) -> AuditResult<Self> {
        let mut catalog = DeclarativeCatalog {
            root: root.to_path_buf(),
            ..Default::default()
        };

        let walker = WalkDir::new(root).sort_by_file_name().into_iter();
        for entry in walker {
            let entry = entry.map_err(|e| AuditError::catalog(root, e.to_string()))?;
            if !entry.file_type().is_file() || !is_document(entry.path()) {
                continue;
            }
            for doc in read_documents(entry.path())? {
                catalog.add_document(entry.path(), doc)?;
            }
        }

        catalog.validate()?;
        catalog.compute_heads()?;
        debug!(
            root = %root.display(),
            packages = catalog.packages.len(),
            channels = catalog.channels.len(),
            bundles = catalog.bundles.len(),
            "Declarative catalog loaded"
        );
        Ok(catalog)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn add_document(&mut self, path: &Path, doc: Value) -> AuditResult<()> {
        let schema = doc
            .get("schema")
            .and_then(Value::as_str)
            .ok_or_else(|| AuditError::malformed(path, "document has no schema"))?
            .to_string();

        let malformed = |e: serde_json::Error| AuditError::malformed(path, format!("{schema}: {e}"));

        match schema.as_str() {
            "olm.package" => {
                let package: PackageDoc = serde_json::from_value(doc).map_err(malformed)?;
                if self.packages.contains_key(&package.name) {
                    return Err(AuditError::malformed(
                        path,
                        format!("duplicate package {:?}", package.name),
                    ));
                }
                self.packages.insert(package.name.clone(), package);
            }
            "olm.channel" => {
                let channel: ChannelDoc = serde_json::from_value(doc).map_err(malformed)?;
                self.channels.push(channel);
            }
            "olm.bundle" => {
                let bundle: BundleDoc = serde_json::from_value(doc).map_err(malformed)?;
                if bundle.name.is_empty() {
                    return Err(AuditError::malformed(path, "bundle with empty name"));
                }
                if self.bundles.contains_key(&bundle.name) {
                    return Err(AuditError::malformed(
                        path,
                        format!("duplicate bundle {:?}", bundle.name),
                    ));
                }
                self.bundles.insert(bundle.name.clone(), bundle);
            }
            "olm.deprecations" => {
                let deprecations: DeprecationsDoc =
                    serde_json::from_value(doc).map_err(malformed)?;
                self.deprecated.extend(
                    deprecations
                        .entries
                        .into_iter()
                        .filter(|e| e.reference.schema == "olm.bundle")
                        .filter_map(|e| e.reference.name),
                );
            }
            other => debug!(path = %path.display(), schema = other, "Skipping unknown schema"),
        }
        Ok(())
    }

    fn validate(&self) -> AuditResult<()> {
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !self.packages.contains_key(&channel.package) {
                return Err(AuditError::malformed(
                    &self.root,
                    format!(
                        "channel {:?} references unknown package {:?}",
                        channel.name, channel.package
                    ),
                ));
            }
            if !seen.insert((channel.package.as_str(), channel.name.as_str())) {
                return Err(AuditError::malformed(
                    &self.root,
                    format!("duplicate channel {:?} in package {:?}", channel.name, channel.package),
                ));
            }
            for entry in &channel.entries {
                let known = self
                    .bundles
                    .get(&entry.name)
                    .map(|b| b.package == channel.package)
                    .unwrap_or(false);
                if !known {
                    return Err(AuditError::malformed(
                        &self.root,
                        format!(
                            "channel {:?} of package {:?} references unknown bundle {:?}",
                            channel.name, channel.package, entry.name
                        ),
                    ));
                }
            }
        }

        for bundle in self.bundles.values() {
            if !bundle.package.is_empty() && !self.packages.contains_key(&bundle.package) {
                return Err(AuditError::malformed(
                    &self.root,
                    format!(
                        "bundle {:?} references unknown package {:?}",
                        bundle.name, bundle.package
                    ),
                ));
            }
        }
        Ok(())
    }

    fn compute_heads(&mut self) -> AuditResult<()> {
        let mut heads = BTreeMap::new();
        for channel in &self.channels {
            if channel.entries.is_empty() {
                continue;
            }
            let mut candidates: BTreeSet<&str> =
                channel.entries.iter().map(|e| e.name.as_str()).collect();
            for entry in &channel.entries {
                if let Some(replaced) = entry.replaces.as_deref() {
                    candidates.remove(replaced);
                }
                for skipped in &entry.skips {
                    candidates.remove(skipped.as_str());
                }
            }

            let head = match candidates.len() {
                1 => candidates.into_iter().next().map(str::to_string),
                0 => None,
                _ => {
                    return Err(AuditError::malformed(
                        &self.root,
                        format!(
                            "channel {:?} of package {:?} has multiple heads: {}",
                            channel.name,
                            channel.package,
                            candidates.into_iter().collect::<Vec<_>>().join(", ")
                        ),
                    ))
                }
            };
            let head = head.ok_or_else(|| {
                AuditError::malformed(
                    &self.root,
                    format!(
                        "channel {:?} of package {:?} has no head (replaces cycle)",
                        channel.name, channel.package
                    ),
                )
            })?;
            heads.insert((channel.package.clone(), channel.name.clone()), head);
        }
        self.heads = heads;
        Ok(())
    }

    /// Head bundle computed for a channel
    pub fn channel_head(&self, package: &str, channel: &str) -> Option<&str> {
        self.heads
            .get(&(package.to_string(), channel.to_string()))
            .map(String::as_str)
    }

    /// Normalize into a snapshot, optionally filtering package names by substring
    pub fn snapshot(&self, filter: Option<&str>) -> CatalogSnapshot {
        let mut packages: BTreeMap<&str, Package> = self
            .packages
            .values()
            .filter(|p| filter.map(|f| p.name.contains(f)).unwrap_or(true))
            .map(|p| {
                (
                    p.name.as_str(),
                    Package::new(&p.name, p.default_channel.clone().unwrap_or_default()),
                )
            })
            .collect();

        for channel in &self.channels {
            if let Some(package) = packages.get_mut(channel.package.as_str()) {
                package.channels.push(Channel {
                    name: channel.name.clone(),
                    package_name: channel.package.clone(),
                    head_bundle: self
                        .channel_head(&channel.package, &channel.name)
                        .map(str::to_string),
                });
            }
        }

        let mut unowned_bundles = Vec::new();
        for doc in self.bundles.values() {
            let mut bundle = Bundle::new(&doc.name, &doc.image);
            bundle.package_name = doc.package.clone();
            bundle.properties = doc
                .properties
                .iter()
                .map(|p| Property::new(&p.property_type, property_value(&p.value)))
                .collect();
            bundle.properties.sort();

            let mut entries: Vec<(&str, &ChannelEntryDoc)> = Vec::new();
            for channel in self.channels.iter().filter(|c| c.package == doc.package) {
                for entry in channel.entries.iter().filter(|e| e.name == doc.name) {
                    entries.push((channel.name.as_str(), entry));
                }
            }
            entries.sort_by(|a, b| a.0.cmp(b.0));

            bundle.channels = entries.iter().map(|(c, _)| c.to_string()).collect();
            bundle.is_head_of_channel = bundle
                .channels
                .iter()
                .any(|c| self.channel_head(&doc.package, c) == Some(doc.name.as_str()));
            bundle.replaces = entries.iter().find_map(|(_, e)| e.replaces.clone());
            bundle.skips = entries
                .iter()
                .find(|(_, e)| !e.skips.is_empty())
                .map(|(_, e)| e.skips.clone())
                .unwrap_or_default();
            bundle.skip_range = entries.iter().find_map(|(_, e)| e.skip_range.clone());

            finish_catalog_bundle(&mut bundle, None);
            bundle.is_deprecated |= self.deprecated.contains(&doc.name);

            if doc.package.is_empty() {
                if filter.is_none() {
                    unowned_bundles.push(bundle);
                }
                continue;
            }
            if let Some(package) = packages.get_mut(doc.package.as_str()) {
                bundle.default_channel = package.default_channel.clone();
                package.bundles.push(bundle);
            }
        }

        CatalogSnapshot {
            packages: packages.into_values().map(check_package).collect(),
            unowned_bundles,
        }
    }
}

/// Property values are stored as JSON text, matching the relational `value` column
fn property_value(value: &Value) -> String {
    value.to_string()
}

/// Read every document of a JSON stream or multi-document YAML file
fn read_documents(path: &Path) -> AuditResult<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuditError::catalog(path, format!("unreadable document: {e}")))?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let mut documents = Vec::new();

    if is_json {
        for doc in serde_json::Deserializer::from_str(&content).into_iter::<Value>() {
            let doc = doc.map_err(|e| AuditError::malformed(path, e.to_string()))?;
            documents.push(doc);
        }
    } else {
        for doc in serde_yaml::Deserializer::from_str(&content) {
            let doc =
                Value::deserialize(doc).map_err(|e| AuditError::malformed(path, e.to_string()))?;
            if !doc.is_null() {
                documents.push(doc);
            }
        }
    }
    Ok(documents)
}

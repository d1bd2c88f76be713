//! Test Helper Utilities
//!
//! Catalog fixtures written in both representations from one description,
//! pre-extracted bundle artifacts for the local fetcher, and a fetcher that
//! fails on request.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use ocaudit::services::fetcher::{ArtifactFetcher, FetchError, FetchedArtifact, LocalDirectoryFetcher};
use ocaudit::services::scratch::sanitize_segment;
use ocaudit::validators::deprecated_api_validator::REMOVED_IN_1_22;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Catalog description
// ============================================================================

#[derive(Debug, Clone)]
pub struct BundleSpec {
    pub name: String,
    pub version: String,
    pub max_ocp_version: Option<String>,
    pub deprecated: bool,
}

impl BundleSpec {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            max_ocp_version: None,
            deprecated: false,
        }
    }

    pub fn max_ocp(mut self, version: &str) -> Self {
        self.max_ocp_version = Some(version.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct EntrySpec {
    pub bundle: String,
    pub replaces: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub entries: Vec<EntrySpec>,
}

impl ChannelSpec {
    /// Linear channel: each bundle replaces the one before it
    pub fn linear(name: &str, bundles: &[&str]) -> Self {
        let entries = bundles
            .iter()
            .enumerate()
            .map(|(i, b)| EntrySpec {
                bundle: b.to_string(),
                replaces: i.checked_sub(1).map(|p| bundles[p].to_string()),
            })
            .collect();
        Self {
            name: name.to_string(),
            entries,
        }
    }

    /// Entry nothing else replaces
    pub fn head(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| {
                !self
                    .entries
                    .iter()
                    .any(|o| o.replaces.as_deref() == Some(e.bundle.as_str()))
            })
            .map(|e| e.bundle.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub name: String,
    pub default_channel: String,
    pub channels: Vec<ChannelSpec>,
    pub bundles: Vec<BundleSpec>,
}

impl PackageSpec {
    pub fn new(name: &str, default_channel: &str) -> Self {
        Self {
            name: name.to_string(),
            default_channel: default_channel.to_string(),
            channels: Vec::new(),
            bundles: Vec::new(),
        }
    }

    pub fn channel(mut self, channel: ChannelSpec) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn bundle(mut self, bundle: BundleSpec) -> Self {
        self.bundles.push(bundle);
        self
    }

    /// `replaces` of a bundle, from the first channel (by name) listing it
    fn replaces_of(&self, bundle: &str) -> Option<String> {
        let mut channels: Vec<&ChannelSpec> = self.channels.iter().collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
            .iter()
            .flat_map(|c| c.entries.iter())
            .filter(|e| e.bundle == bundle)
            .find_map(|e| e.replaces.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogSpec {
    pub packages: Vec<PackageSpec>,
}

pub fn image_for(bundle: &str) -> String {
    format!("quay.io/ocaudit-test/{bundle}:latest")
}

// ============================================================================
// Declarative catalog
// ============================================================================

/// Write `<root>/configs/<package>/catalog.json` documents for every package
pub fn write_declarative_catalog(root: &Path, spec: &CatalogSpec) -> Result<PathBuf> {
    for package in &spec.packages {
        let dir = root.join("configs").join(&package.name);
        std::fs::create_dir_all(&dir)?;

        let mut docs: Vec<Value> = vec![json!({
            "schema": "olm.package",
            "name": package.name,
            "defaultChannel": package.default_channel,
        })];
        for channel in &package.channels {
            let entries: Vec<Value> = channel
                .entries
                .iter()
                .map(|e| match &e.replaces {
                    Some(r) => json!({"name": e.bundle, "replaces": r}),
                    None => json!({"name": e.bundle}),
                })
                .collect();
            docs.push(json!({
                "schema": "olm.channel",
                "package": package.name,
                "name": channel.name,
                "entries": entries,
            }));
        }
        for bundle in &package.bundles {
            let mut properties = vec![json!({
                "type": "olm.package",
                "value": {"packageName": package.name, "version": bundle.version},
            })];
            if let Some(max) = &bundle.max_ocp_version {
                properties.push(json!({"type": "olm.maxOpenShiftVersion", "value": max}));
            }
            if bundle.deprecated {
                properties.push(json!({"type": "olm.deprecated", "value": {}}));
            }
            docs.push(json!({
                "schema": "olm.bundle",
                "name": bundle.name,
                "package": package.name,
                "image": image_for(&bundle.name),
                "properties": properties,
            }));
        }

        let stream: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
        std::fs::write(dir.join("catalog.json"), stream.join("\n"))?;
    }
    Ok(root.to_path_buf())
}

// ============================================================================
// Relational catalog
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE package (name TEXT PRIMARY KEY, default_channel TEXT)",
    "CREATE TABLE channel (name TEXT, package_name TEXT, head_operatorbundle_name TEXT, PRIMARY KEY (name, package_name))",
    "CREATE TABLE channel_entry (entry_id INTEGER PRIMARY KEY, channel_name TEXT, package_name TEXT, operatorbundle_name TEXT, replaces INTEGER, depth INTEGER)",
    "CREATE TABLE operatorbundle (name TEXT PRIMARY KEY, csv TEXT, bundle TEXT, bundlepath TEXT, version TEXT, skiprange TEXT, replaces TEXT, skips TEXT)",
    "CREATE TABLE properties (type TEXT, value TEXT, operatorbundle_name TEXT, operatorbundle_version TEXT, operatorbundle_path TEXT)",
];

async fn open_writable(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Delete)
        .create_if_missing(true);
    Ok(SqlitePool::connect_with(options).await?)
}

/// Create the catalog tables only
pub async fn create_relational_schema(path: &Path) -> Result<SqlitePool> {
    let pool = open_writable(path).await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    Ok(pool)
}

/// Database holding only the first `tables` catalog tables
pub async fn write_partial_schema(path: &Path, tables: usize) -> Result<()> {
    let pool = open_writable(path).await?;
    for statement in SCHEMA.iter().take(tables) {
        sqlx::query(statement).execute(&pool).await?;
    }
    pool.close().await;
    Ok(())
}

/// Write `spec` as an index database at `path`
pub async fn write_relational_catalog(path: &Path, spec: &CatalogSpec) -> Result<PathBuf> {
    let pool = create_relational_schema(path).await?;

    for package in &spec.packages {
        sqlx::query("INSERT INTO package (name, default_channel) VALUES (?, ?)")
            .bind(&package.name)
            .bind(&package.default_channel)
            .execute(&pool)
            .await?;

        for channel in &package.channels {
            sqlx::query("INSERT INTO channel (name, package_name, head_operatorbundle_name) VALUES (?, ?, ?)")
                .bind(&channel.name)
                .bind(&package.name)
                .bind(channel.head())
                .execute(&pool)
                .await?;
            for entry in &channel.entries {
                sqlx::query("INSERT INTO channel_entry (channel_name, package_name, operatorbundle_name) VALUES (?, ?, ?)")
                    .bind(&channel.name)
                    .bind(&package.name)
                    .bind(&entry.bundle)
                    .execute(&pool)
                    .await?;
            }
        }

        for bundle in &package.bundles {
            sqlx::query("INSERT INTO operatorbundle (name, bundlepath, version, replaces, skips, skiprange) VALUES (?, ?, ?, ?, '', '')")
                .bind(&bundle.name)
                .bind(image_for(&bundle.name))
                .bind(&bundle.version)
                .bind(package.replaces_of(&bundle.name))
                .execute(&pool)
                .await?;

            let mut properties = vec![(
                "olm.package".to_string(),
                json!({"packageName": package.name, "version": bundle.version}).to_string(),
            )];
            if let Some(max) = &bundle.max_ocp_version {
                properties.push(("olm.maxOpenShiftVersion".to_string(), Value::from(max.as_str()).to_string()));
            }
            if bundle.deprecated {
                properties.push(("olm.deprecated".to_string(), "{}".to_string()));
            }
            for (property_type, value) in properties {
                sqlx::query("INSERT INTO properties (type, value, operatorbundle_name) VALUES (?, ?, ?)")
                    .bind(property_type)
                    .bind(value)
                    .bind(&bundle.name)
                    .execute(&pool)
                    .await?;
            }
        }
    }

    pool.close().await;
    Ok(path.to_path_buf())
}

/// Insert a bundle with no channel membership
pub async fn insert_unowned_bundle(path: &Path, name: &str) -> Result<()> {
    let pool = open_writable(path).await?;
    sqlx::query("INSERT INTO operatorbundle (name, bundlepath, version) VALUES (?, ?, '1.0.0')")
        .bind(name)
        .bind(image_for(name))
        .execute(&pool)
        .await?;
    pool.close().await;
    Ok(())
}

// ============================================================================
// Bundle artifacts
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ArtifactSpec {
    pub package: String,
    pub version: String,
    /// Kinds shipped with an API version removed in Kubernetes 1.22
    pub removed_api_kinds: Vec<String>,
    pub ocp_label: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Leave the ClusterServiceVersion out of `manifests/`
    pub without_csv: bool,
}

impl ArtifactSpec {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn using(mut self, kind: &str) -> Self {
        self.removed_api_kinds.push(kind.to_string());
        self
    }

    pub fn ocp_label(mut self, label: &str) -> Self {
        self.ocp_label = Some(label.to_string());
        self
    }

    pub fn label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    pub fn without_csv(mut self) -> Self {
        self.without_csv = true;
        self
    }
}

fn removed_api_version(kind: &str) -> &'static str {
    REMOVED_IN_1_22
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(v, _)| *v)
        .unwrap_or("extensions/v1beta1")
}

/// Write a pre-extracted artifact for `bundle` under `root` in the local fetcher layout
pub fn write_artifact(root: &Path, bundle: &str, spec: &ArtifactSpec) -> Result<PathBuf> {
    let dir = root.join(sanitize_segment(&image_for(bundle)));
    std::fs::create_dir_all(dir.join("manifests"))?;
    std::fs::create_dir_all(dir.join("metadata"))?;

    let csv = json!({
        "apiVersion": "operators.coreos.com/v1alpha1",
        "kind": "ClusterServiceVersion",
        "metadata": {
            "name": bundle,
            "annotations": {
                "capabilities": "Basic Install",
                "categories": "Database",
                "containerImage": format!("quay.io/ocaudit-test/{}-operator:{}", spec.package, spec.version),
            },
        },
        "spec": {
            "version": spec.version,
            "description": format!("{} operator", spec.package),
        },
    });
    if !spec.without_csv {
        std::fs::write(dir.join("manifests").join("csv.json"), serde_json::to_string_pretty(&csv)?)?;
    }

    let mut objects = vec![format!(
        "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: things.{}.example.com\n",
        spec.package
    )];
    for (i, kind) in spec.removed_api_kinds.iter().enumerate() {
        objects.push(format!(
            "apiVersion: {}\nkind: {}\nmetadata:\n  name: legacy-{}\n",
            removed_api_version(kind),
            kind,
            i
        ));
    }
    std::fs::write(dir.join("manifests").join("objects.yaml"), objects.join("---\n"))?;

    let mut annotations = format!(
        "annotations:\n  operators.operatorframework.io.bundle.package.v1: {}\n",
        spec.package
    );
    if let Some(label) = &spec.ocp_label {
        annotations.push_str(&format!("  com.redhat.openshift.versions: \"{label}\"\n"));
    }
    std::fs::write(dir.join("metadata").join("annotations.yaml"), annotations)?;

    if !spec.labels.is_empty() {
        std::fs::write(dir.join("labels.json"), serde_json::to_string(&spec.labels)?)?;
    }
    Ok(dir)
}

// ============================================================================
// Scripted fetcher
// ============================================================================

/// Local fetcher that fails or stalls for chosen references and counts calls
pub struct ScriptedFetcher {
    inner: LocalDirectoryFetcher,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub fetches: AtomicUsize,
    pub releases: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalDirectoryFetcher::new(root),
            failing: HashSet::new(),
            delays: HashMap::new(),
            fetches: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn failing_for(mut self, bundle: &str) -> Self {
        self.failing.insert(image_for(bundle));
        self
    }

    /// Sleep for `delay` before fetching `bundle`
    pub fn slow_for(mut self, bundle: &str, delay: Duration) -> Self {
        self.delays.insert(image_for(bundle), delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for ScriptedFetcher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, reference: &str, scratch: &Path) -> Result<FetchedArtifact, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(reference) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(reference) {
            return Err(FetchError::Fetch {
                reference: reference.to_string(),
                message: "simulated registry outage".to_string(),
            });
        }
        self.inner.fetch(reference, scratch).await
    }

    async fn release(&self, _reference: &str) -> Result<(), FetchError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Number of entries directly under `dir`
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

// ============================================================================
// Shared fixtures
// ============================================================================

/// etcd: two channels, older bundle pinned below 4.9.
/// prometheus: one linear channel, older bundle deprecated.
pub fn sample_catalog() -> CatalogSpec {
    CatalogSpec {
        packages: vec![
            PackageSpec::new("etcd", "stable")
                .channel(ChannelSpec::linear("alpha", &["etcd.v0.9.4"]))
                .channel(ChannelSpec::linear("stable", &["etcd.v0.9.2", "etcd.v0.9.4"]))
                .bundle(BundleSpec::new("etcd.v0.9.2", "0.9.2").max_ocp("4.8"))
                .bundle(BundleSpec::new("etcd.v0.9.4", "0.9.4")),
            PackageSpec::new("prometheus", "beta")
                .channel(ChannelSpec::linear("beta", &["prometheus.v0.22.2", "prometheus.v0.27.0"]))
                .bundle(BundleSpec {
                    deprecated: true,
                    ..BundleSpec::new("prometheus.v0.22.2", "0.22.2")
                })
                .bundle(BundleSpec::new("prometheus.v0.27.0", "0.27.0")),
        ],
    }
}

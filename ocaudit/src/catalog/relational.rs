//! Relational catalog variant
//!
//! Read-only access to an embedded SQLite catalog with the `package`,
//! `channel`, `channel_entry`, `operatorbundle` and `properties` tables.
//! The database is opened with `mode=ro`; no statement here writes.

use super::{finish_catalog_bundle, CatalogSnapshot};
use crate::error::{AuditError, AuditResult};
use ocaudit_common::models::{Bundle, Channel, Package, Property};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const REQUIRED_TABLES: [&str; 5] = [
    "package",
    "channel",
    "channel_entry",
    "operatorbundle",
    "properties",
];

/// Channel membership row from `channel_entry`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntryRow {
    pub channel_name: String,
    pub package_name: String,
    pub bundle_name: String,
}

/// Bundle row from `operatorbundle`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRow {
    pub name: String,
    pub bundle_path: Option<String>,
    pub version: Option<String>,
    pub replaces: Option<String>,
    pub skips: Option<String>,
    pub skip_range: Option<String>,
}

/// Opened relational catalog
#[derive(Debug)]
pub struct RelationalCatalog {
    pool: SqlitePool,
    path: PathBuf,
}

impl RelationalCatalog {
    /// Open the database read-only and check the expected tables exist
    pub async fn open(path: &Path) -> AuditResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AuditError::catalog(path, format!("failed to open database: {e}")))?;

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&pool)
                .await
                .map_err(|e| AuditError::catalog(path, format!("not a catalog database: {e}")))?;

        let missing: Vec<&str> = REQUIRED_TABLES
            .iter()
            .copied()
            .filter(|t| !tables.iter().any(|name| name == t))
            .collect();
        if !missing.is_empty() {
            return Err(AuditError::catalog(
                path,
                format!("missing catalog tables: {}", missing.join(", ")),
            ));
        }

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Packages as `(name, default_channel)`, optionally filtered by name substring
    pub async fn list_packages(&self, filter: Option<&str>) -> AuditResult<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT name, default_channel
            FROM package
            WHERE ? IS NULL OR instr(name, ?) > 0
            ORDER BY name
            "#,
        )
        .bind(filter)
        .bind(filter)
        .fetch_all(&self.pool)
        .await?;

        let mut packages = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let default_channel: Option<String> = row.try_get("default_channel")?;
            packages.push((name, default_channel.unwrap_or_default()));
        }
        Ok(packages)
    }

    pub async fn list_channels(&self) -> AuditResult<Vec<Channel>> {
        let rows = sqlx::query(
            r#"
            SELECT name, package_name, head_operatorbundle_name
            FROM channel
            ORDER BY package_name, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for row in rows {
            channels.push(Channel {
                name: row.try_get("name")?,
                package_name: row.try_get("package_name")?,
                head_bundle: row.try_get("head_operatorbundle_name")?,
            });
        }
        Ok(channels)
    }

    /// Channel-entry to bundle joins recovering bundle membership
    pub async fn list_channel_entries(&self) -> AuditResult<Vec<ChannelEntryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT e.channel_name, e.package_name, e.operatorbundle_name
            FROM channel_entry e
            JOIN operatorbundle o ON o.name = e.operatorbundle_name
            ORDER BY e.operatorbundle_name, e.channel_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(ChannelEntryRow {
                channel_name: row.try_get("channel_name")?,
                package_name: row.try_get("package_name")?,
                bundle_name: row.try_get("operatorbundle_name")?,
            });
        }
        Ok(entries)
    }

    pub async fn list_bundles(&self) -> AuditResult<Vec<BundleRow>> {
        let rows = sqlx::query(
            r#"
            SELECT name, bundlepath, version, replaces, skips, skiprange
            FROM operatorbundle
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            bundles.push(BundleRow {
                name: row.try_get("name")?,
                bundle_path: row.try_get("bundlepath")?,
                version: row.try_get("version")?,
                replaces: row.try_get("replaces")?,
                skips: row.try_get("skips")?,
                skip_range: row.try_get("skiprange")?,
            });
        }
        Ok(bundles)
    }

    /// Properties per bundle, kept as opaque `(type, value)` pairs
    pub async fn list_properties(&self) -> AuditResult<HashMap<String, Vec<Property>>> {
        let rows = sqlx::query(
            r#"
            SELECT type, value, operatorbundle_name
            FROM properties
            ORDER BY operatorbundle_name, type, value
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut properties: HashMap<String, Vec<Property>> = HashMap::new();
        for row in rows {
            let bundle: String = row.try_get("operatorbundle_name")?;
            let property_type: String = row.try_get("type")?;
            let value: Option<String> = row.try_get("value")?;
            properties
                .entry(bundle)
                .or_default()
                .push(Property::new(property_type, value.unwrap_or_default()));
        }
        Ok(properties)
    }

    /// Assemble the package → channel → bundle graph
    pub async fn read_snapshot(&self, filter: Option<&str>) -> AuditResult<CatalogSnapshot> {
        let mut packages: BTreeMap<String, Package> = self
            .list_packages(filter)
            .await?
            .into_iter()
            .map(|(name, default_channel)| (name.clone(), Package::new(name, default_channel)))
            .collect();

        let bundle_rows = self.list_bundles().await?;
        let known_bundles: HashSet<&str> = bundle_rows.iter().map(|b| b.name.as_str()).collect();

        let mut heads: HashSet<String> = HashSet::new();
        for mut channel in self.list_channels().await? {
            if let Some(head) = channel.head_bundle.as_deref() {
                if known_bundles.contains(head) {
                    heads.insert(head.to_string());
                } else {
                    warn!(
                        channel = %channel.name,
                        package = %channel.package_name,
                        head,
                        "Channel head is not a catalog bundle; ignoring"
                    );
                    channel.head_bundle = None;
                }
            }
            if let Some(package) = packages.get_mut(&channel.package_name) {
                package.channels.push(channel);
            }
        }

        let mut membership: HashMap<String, (String, BTreeSet<String>)> = HashMap::new();
        for entry in self.list_channel_entries().await? {
            let slot = membership
                .entry(entry.bundle_name)
                .or_insert_with(|| (entry.package_name.clone(), BTreeSet::new()));
            slot.1.insert(entry.channel_name);
        }

        let mut properties = self.list_properties().await?;
        let mut unowned_bundles = Vec::new();

        for row in bundle_rows {
            let mut bundle = Bundle::new(&row.name, row.bundle_path.clone().unwrap_or_default());
            bundle.replaces = row.replaces.filter(|r| !r.is_empty());
            bundle.skips = split_skips(row.skips.as_deref());
            bundle.skip_range = row.skip_range.filter(|r| !r.is_empty());
            bundle.properties = properties.remove(&row.name).unwrap_or_default();
            bundle.is_head_of_channel = heads.contains(&row.name);

            match membership.remove(&row.name) {
                Some((package_name, channels)) => {
                    let Some(package) = packages.get_mut(&package_name) else {
                        continue;
                    };
                    bundle.package_name = package_name;
                    bundle.channels = channels;
                    bundle.default_channel = package.default_channel.clone();
                    finish_catalog_bundle(&mut bundle, row.version.as_deref());
                    package.bundles.push(bundle);
                }
                None if filter.is_none() => {
                    finish_catalog_bundle(&mut bundle, row.version.as_deref());
                    unowned_bundles.push(bundle);
                }
                None => {}
            }
        }

        let packages: Vec<Package> = packages.into_values().map(super::check_package).collect();
        debug!(
            path = %self.path.display(),
            packages = packages.len(),
            unowned = unowned_bundles.len(),
            "Relational catalog read"
        );

        Ok(CatalogSnapshot {
            packages,
            unowned_bundles,
        })
    }
}

fn split_skips(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

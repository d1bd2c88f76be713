//! Bundle manifest parser
//!
//! Turns an extracted manifest directory into a [`BundleManifest`]:
//!
//! ```text
//! <dir>/manifests/*.yaml|*.yml|*.json   ClusterServiceVersion + other objects
//! <dir>/metadata/annotations.yaml       bundle annotations (optional)
//! ```
//!
//! Exactly one ClusterServiceVersion is required. Every other object is kept
//! only as `(apiVersion, kind, name)`, which is all the validators need.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const PACKAGE_ANNOTATION: &str = "operators.operatorframework.io.bundle.package.v1";
pub const OCP_VERSIONS_ANNOTATION: &str = "com.redhat.openshift.versions";
pub const BUILDER_ANNOTATION: &str = "operators.operatorframework.io/builder";
pub const INFRASTRUCTURE_FEATURES_ANNOTATION: &str = "operators.openshift.io/infrastructure-features";
pub const OLM_PROPERTIES_ANNOTATION: &str = "olm.properties";
pub const ARCH_LABEL_PREFIX: &str = "operatorframework.io/arch.";

/// Manifest parsing errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifests directory not found: {0}")]
    MissingManifests(PathBuf),

    #[error("no ClusterServiceVersion found in {0}")]
    MissingCsv(PathBuf),

    #[error("multiple ClusterServiceVersions found: {0}")]
    MultipleCsvs(String),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Kubernetes object found in the manifest set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub file: PathBuf,
}

/// ClusterServiceVersion fields used by the audit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvManifest {
    pub name: String,
    pub version: Option<String>,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub description: Option<String>,
    /// Full document, for validators that need more
    pub raw: Value,
}

/// Structured bundle representation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleManifest {
    pub csv: CsvManifest,
    pub objects: Vec<ManifestObject>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AnnotationsFile {
    #[serde(default)]
    annotations: BTreeMap<String, Value>,
}

impl BundleManifest {
    /// Package name declared by the bundle annotations
    pub fn package_name(&self) -> Option<&str> {
        self.annotations
            .get(PACKAGE_ANNOTATION)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// `com.redhat.openshift.versions`, from annotations.yaml or the CSV
    pub fn ocp_label(&self) -> Option<&str> {
        self.annotations
            .get(OCP_VERSIONS_ANNOTATION)
            .or_else(|| self.csv.annotations.get(OCP_VERSIONS_ANNOTATION))
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// `olm.maxOpenShiftVersion` carried in the CSV `olm.properties` annotation
    pub fn max_ocp_version(&self) -> Option<String> {
        let raw = self.csv.annotations.get(OLM_PROPERTIES_ANNOTATION)?;
        let properties: Vec<Value> = serde_json::from_str(raw).ok()?;
        properties.iter().find_map(|p| {
            if p.get("type").and_then(Value::as_str) != Some("olm.maxOpenShiftVersion") {
                return None;
            }
            match p.get("value")? {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        })
    }

    /// Architectures the CSV labels as supported, sorted
    pub fn architectures(&self) -> Vec<String> {
        self.csv
            .labels
            .iter()
            .filter(|(_, v)| v.as_str() == "supported")
            .filter_map(|(k, _)| k.strip_prefix(ARCH_LABEL_PREFIX))
            .map(str::to_string)
            .collect()
    }

    pub fn builder(&self) -> Option<&str> {
        self.csv.annotations.get(BUILDER_ANNOTATION).map(String::as_str)
    }

    pub fn infrastructure_features(&self) -> Option<&str> {
        self.csv
            .annotations
            .get(INFRASTRUCTURE_FEATURES_ANNOTATION)
            .map(String::as_str)
    }
}

/// Parse an extracted bundle directory
pub fn parse_bundle_dir(dir: &Path) -> Result<BundleManifest, ManifestError> {
    let manifests_dir = dir.join("manifests");
    if !manifests_dir.is_dir() {
        return Err(ManifestError::MissingManifests(manifests_dir));
    }

    let mut csvs: Vec<(PathBuf, Value)> = Vec::new();
    let mut objects = Vec::new();

    for entry in WalkDir::new(&manifests_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ManifestError::Parse {
            path: manifests_dir.clone(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_manifest_file(path) {
            continue;
        }

        for doc in read_documents(path)? {
            let kind = doc.get("kind").and_then(Value::as_str).unwrap_or_default();
            if kind.is_empty() {
                continue;
            }
            if kind == "ClusterServiceVersion" {
                csvs.push((path.to_path_buf(), doc));
            } else {
                objects.push(ManifestObject {
                    api_version: str_at(&doc, &["apiVersion"]).unwrap_or_default(),
                    kind: kind.to_string(),
                    name: str_at(&doc, &["metadata", "name"]).unwrap_or_default(),
                    file: path.to_path_buf(),
                });
            }
        }
    }

    let (csv_path, csv_doc) = match csvs.len() {
        0 => return Err(ManifestError::MissingCsv(manifests_dir)),
        1 => csvs.remove(0),
        _ => {
            let files: Vec<String> = csvs.iter().map(|(p, _)| p.display().to_string()).collect();
            return Err(ManifestError::MultipleCsvs(files.join(", ")));
        }
    };

    let csv = parse_csv(&csv_path, csv_doc)?;
    let annotations = read_annotations(&dir.join("metadata").join("annotations.yaml"))?;

    Ok(BundleManifest {
        csv,
        objects,
        annotations,
    })
}

fn parse_csv(path: &Path, doc: Value) -> Result<CsvManifest, ManifestError> {
    let name = str_at(&doc, &["metadata", "name"]).ok_or_else(|| ManifestError::Parse {
        path: path.to_path_buf(),
        message: "ClusterServiceVersion has no metadata.name".to_string(),
    })?;

    let skips = doc
        .get("spec")
        .and_then(|s| s.get("skips"))
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(CsvManifest {
        name,
        version: scalar_at(&doc, &["spec", "version"]),
        replaces: str_at(&doc, &["spec", "replaces"]).filter(|r| !r.is_empty()),
        skips,
        annotations: string_map(doc.get("metadata").and_then(|m| m.get("annotations"))),
        labels: string_map(doc.get("metadata").and_then(|m| m.get("labels"))),
        description: str_at(&doc, &["spec", "description"]).filter(|d| !d.trim().is_empty()),
        raw: doc,
    })
}

fn read_annotations(path: &Path) -> Result<BTreeMap<String, String>, ManifestError> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: AnnotationsFile = serde_yaml::from_str(&content).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(file
        .annotations
        .into_iter()
        .filter_map(|(k, v)| scalar_string(&v).map(|v| (k, v)))
        .collect())
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml") | Some("json")
    )
}

fn read_documents(path: &Path) -> Result<Vec<Value>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| ManifestError::Parse {
        path: path.to_path_buf(),
        message,
    };

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let doc: Value = serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
        return Ok(vec![doc]);
    }

    let mut documents = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(&content) {
        let value = Value::deserialize(doc).map_err(|e| parse_error(e.to_string()))?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

fn value_at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |v, key| v.get(key))
}

fn str_at(doc: &Value, path: &[&str]) -> Option<String> {
    value_at(doc, path).and_then(Value::as_str).map(str::to_string)
}

/// String or number at `path`, as text (YAML may type `1.0` as a float)
fn scalar_at(doc: &Value, path: &[&str]) -> Option<String> {
    value_at(doc, path).and_then(scalar_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| scalar_string(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

//! Artifact fetchers
//!
//! The enrichment pool only sees the [`ArtifactFetcher`] trait: given an
//! artifact reference and a scratch directory, produce the directory holding
//! the bundle's `manifests/` (and optionally `metadata/`) plus the artifact's
//! metadata labels. How the artifact is obtained is the fetcher's business.
//!
//! # Implementations
//! - [`LocalDirectoryFetcher`]: artifacts pre-extracted under a local root
//! - [`ContainerToolFetcher`]: pulls images with a container CLI (`docker`/`podman`)

use crate::services::scratch::sanitize_segment;
use async_trait::async_trait;
use ocaudit_common::models::AuditStage;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Fetcher errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Bundle has no artifact reference
    #[error("bundle has no artifact reference")]
    EmptyReference,

    /// Artifact could not be found or pulled
    #[error("failed to fetch {reference}: {message}")]
    Fetch { reference: String, message: String },

    /// Artifact fetched but its manifests could not be extracted
    #[error("failed to extract manifests from {reference}: {message}")]
    Extract { reference: String, message: String },

    /// I/O error while extracting
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Enrichment stage the error is recorded under
    pub fn stage(&self) -> AuditStage {
        match self {
            FetchError::EmptyReference | FetchError::Fetch { .. } => AuditStage::Fetch,
            FetchError::Extract { .. } | FetchError::Io(_) => AuditStage::Extract,
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Directory containing `manifests/` and optionally `metadata/`
    pub manifest_dir: PathBuf,
    /// Metadata labels carried by the artifact
    pub labels: BTreeMap<String, String>,
}

/// Obtains bundle artifacts and extracts their manifests
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetcher name for logging
    fn name(&self) -> &'static str;

    /// Fetch `reference` and extract its manifest set into `scratch`
    async fn fetch(&self, reference: &str, scratch: &Path) -> Result<FetchedArtifact, FetchError>;

    /// Release anything `fetch` retained outside the scratch directory
    ///
    /// Called after every fetch attempt, successful or not.
    async fn release(&self, _reference: &str) -> Result<(), FetchError> {
        Ok(())
    }
}

// ============================================================================
// Local directory fetcher
// ============================================================================

/// Resolves references to pre-extracted artifact directories
///
/// `reference` maps to `<root>/<sanitized reference>/`, which holds
/// `manifests/`, optionally `metadata/`, and optionally `labels.json`
/// (a flat JSON object of label name to value).
#[derive(Debug, Clone)]
pub struct LocalDirectoryFetcher {
    root: PathBuf,
}

impl LocalDirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory a reference resolves to
    pub fn artifact_dir(&self, reference: &str) -> PathBuf {
        self.root.join(sanitize_segment(reference))
    }
}

#[async_trait]
impl ArtifactFetcher for LocalDirectoryFetcher {
    fn name(&self) -> &'static str {
        "local-directory"
    }

    async fn fetch(&self, reference: &str, scratch: &Path) -> Result<FetchedArtifact, FetchError> {
        if reference.trim().is_empty() {
            return Err(FetchError::EmptyReference);
        }

        let source = self.artifact_dir(reference);
        if !source.is_dir() {
            return Err(FetchError::Fetch {
                reference: reference.to_string(),
                message: format!("no artifact directory at {}", source.display()),
            });
        }

        let labels = match tokio::fs::read_to_string(source.join("labels.json")).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| FetchError::Fetch {
                reference: reference.to_string(),
                message: format!("invalid labels.json: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let manifests = source.join("manifests");
        if !manifests.is_dir() {
            return Err(FetchError::Extract {
                reference: reference.to_string(),
                message: "artifact has no manifests directory".to_string(),
            });
        }

        let target = scratch.to_path_buf();
        let source_clone = source.clone();
        tokio::task::spawn_blocking(move || -> Result<(), FetchError> {
            copy_tree(&source_clone.join("manifests"), &target.join("manifests"))?;
            let metadata = source_clone.join("metadata");
            if metadata.is_dir() {
                copy_tree(&metadata, &target.join("metadata"))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| FetchError::Extract {
            reference: reference.to_string(),
            message: format!("copy task failed: {e}"),
        })??;

        debug!(reference, source = %source.display(), "Artifact copied into scratch directory");
        Ok(FetchedArtifact {
            manifest_dir: scratch.to_path_buf(),
            labels,
        })
    }
}

/// Recursively copy `from` into `to`
fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// ============================================================================
// Container tool fetcher
// ============================================================================

/// Pulls bundle images with an external container CLI
///
/// Sequence per reference: `image inspect` (local cache check), `pull` when
/// missing, `inspect` (labels), `create`, `cp` of `/manifests` and
/// `/metadata`, `rm`. The created container is removed even when copying
/// fails. [`ArtifactFetcher::release`] removes only images this fetcher
/// pulled; images already cached locally are left in place.
#[derive(Debug, Clone)]
pub struct ContainerToolFetcher {
    tool: String,
    pulled: Arc<Mutex<HashSet<String>>>,
}

impl ContainerToolFetcher {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            pulled: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    async fn is_cached(&self, reference: &str) -> bool {
        self.run(&["image", "inspect", reference]).await.is_ok()
    }

    async fn run(&self, args: &[&str]) -> Result<String, String> {
        debug!(tool = %self.tool, ?args, "Running container tool");
        let output = Command::new(&self.tool)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to execute {}: {}", self.tool, e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(format!(
                "{} {} exited with {}: {}",
                self.tool,
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    async fn labels(&self, reference: &str) -> Result<BTreeMap<String, String>, FetchError> {
        let raw = self
            .run(&["inspect", "--format", "{{json .Config.Labels}}", reference])
            .await
            .map_err(|message| FetchError::Fetch {
                reference: reference.to_string(),
                message,
            })?;
        parse_labels(&raw).map_err(|message| FetchError::Fetch {
            reference: reference.to_string(),
            message,
        })
    }

    async fn copy_out(&self, container: &str, scratch: &Path, reference: &str) -> Result<(), FetchError> {
        let manifests_src = format!("{container}:/manifests");
        let manifests_dst = scratch.join("manifests").to_string_lossy().to_string();
        self.run(&["cp", manifests_src.as_str(), manifests_dst.as_str()])
            .await
            .map_err(|message| FetchError::Extract {
                reference: reference.to_string(),
                message,
            })?;

        let metadata_src = format!("{container}:/metadata");
        let metadata_dst = scratch.join("metadata").to_string_lossy().to_string();
        if let Err(message) = self
            .run(&["cp", metadata_src.as_str(), metadata_dst.as_str()])
            .await
        {
            debug!(reference, %message, "Bundle image has no metadata directory");
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for ContainerToolFetcher {
    fn name(&self) -> &'static str {
        "container-tool"
    }

    async fn fetch(&self, reference: &str, scratch: &Path) -> Result<FetchedArtifact, FetchError> {
        if reference.trim().is_empty() {
            return Err(FetchError::EmptyReference);
        }

        if self.is_cached(reference).await {
            debug!(reference, "Image already present locally, skipping pull");
        } else {
            self.run(&["pull", reference])
                .await
                .map_err(|message| FetchError::Fetch {
                    reference: reference.to_string(),
                    message,
                })?;
            self.pulled
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(reference.to_string());
        }

        let labels = self.labels(reference).await?;

        // Bundle images have no entrypoint; the trailing argument only satisfies `create`
        let container = self
            .run(&["create", reference, "ocaudit"])
            .await
            .map_err(|message| FetchError::Extract {
                reference: reference.to_string(),
                message,
            })?;

        let copied = self.copy_out(&container, scratch, reference).await;

        if let Err(message) = self.run(&["rm", container.as_str()]).await {
            warn!(reference, container = %container, %message, "Failed to remove container");
        }

        copied?;
        Ok(FetchedArtifact {
            manifest_dir: scratch.to_path_buf(),
            labels,
        })
    }

    async fn release(&self, reference: &str) -> Result<(), FetchError> {
        let pulled = self
            .pulled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(reference);
        if !pulled {
            return Ok(());
        }
        self.run(&["rmi", reference])
            .await
            .map(|_| ())
            .map_err(|message| FetchError::Fetch {
                reference: reference.to_string(),
                message,
            })
    }
}

/// Parse `inspect` label output; `null` means no labels
fn parse_labels(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(raw).map_err(|e| format!("invalid label output: {e}"))
}

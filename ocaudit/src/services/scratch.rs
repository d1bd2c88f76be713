//! Per-bundle scratch directories
//!
//! Every worker extracts into its own directory whose name starts with the
//! bundle name, so two workers never share a path. The directory is removed
//! when the [`ScratchDir`] is dropped, which covers every early return and
//! error path of a worker.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Owned, bundle-named temporary directory
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory for `bundle_name` under `root` (system temp if `None`)
    pub fn create(bundle_name: &str, root: Option<&Path>) -> io::Result<Self> {
        let prefix = format!("ocaudit-{}-", sanitize_segment(bundle_name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now, reporting failures instead of ignoring them
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }

    /// Path the directory had; only meaningful for logging after close
    pub fn path_buf(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

/// Reduce an arbitrary name or reference to one safe path segment
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

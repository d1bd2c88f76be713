//! Audit configuration
//!
//! Two sources, highest priority first:
//! 1. Command-line flags (applied via [`AuditConfig::apply_overrides`])
//! 2. TOML bootstrap file (`[audit]` and `[logging]` sections)
//!
//! Missing values fall back to built-in defaults. The resulting
//! [`AuditConfig`] is built once per run and passed by reference to every
//! stage; nothing reads configuration from globals.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of concurrent enrichment workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// One entry of the deprecation pattern table
///
/// `pattern` is a regular expression matched against validator messages;
/// a match attributes the message to deprecated API `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationPattern {
    pub pattern: String,
    pub kind: String,
}

/// Flat run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Substring match on package name; empty means every package
    pub filter: String,

    /// Cap on bundles processed, 0 = unlimited
    pub limit: usize,

    pub disable_validators: bool,

    pub disable_conformance_tests: bool,

    /// Only audit bundles whose artifact carries this label
    pub label: Option<String>,

    /// Required value of `label`; requires `label`
    pub label_value: Option<String>,

    /// Concurrent enrichment workers
    pub worker_count: usize,

    /// Per-bundle time budget in seconds, 0 = none
    pub bundle_timeout_secs: u64,

    /// Container CLI used by the container fetcher (`docker` or `podman`)
    pub container_tool: String,

    /// Conformance test binary (runs `<binary> scorecard`)
    pub conformance_binary: String,

    /// Kubeconfig for the conformance test cluster
    pub kubeconfig: Option<PathBuf>,

    /// Base directory for per-bundle scratch directories (system temp if unset)
    pub scratch_root: Option<PathBuf>,

    /// Replaces the built-in deprecation pattern table when set
    pub deprecation_patterns: Option<Vec<DeprecationPattern>>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            filter: String::new(),
            limit: 0,
            disable_validators: false,
            disable_conformance_tests: false,
            label: None,
            label_value: None,
            worker_count: DEFAULT_WORKER_COUNT,
            bundle_timeout_secs: 0,
            container_tool: "docker".to_string(),
            conformance_binary: "operator-sdk".to_string(),
            kubeconfig: None,
            scratch_root: None,
            deprecation_patterns: None,
        }
    }
}

/// Command-line values that override the file configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub disable_validators: bool,
    pub disable_conformance_tests: bool,
    pub label: Option<String>,
    pub label_value: Option<String>,
    pub worker_count: Option<usize>,
    pub bundle_timeout_secs: Option<u64>,
    pub container_tool: Option<String>,
    pub conformance_binary: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub scratch_root: Option<PathBuf>,
}

impl AuditConfig {
    /// Reject invalid option combinations before any stage runs
    pub fn validate(&self) -> Result<()> {
        if self.label_value.is_some() && self.label.is_none() {
            return Err(Error::Config(
                "label value given without a label name".to_string(),
            ));
        }
        if matches!(&self.label, Some(l) if l.trim().is_empty()) {
            return Err(Error::Config("label name is empty".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        if self.container_tool.trim().is_empty() {
            return Err(Error::Config("container tool is empty".to_string()));
        }
        if let Some(patterns) = &self.deprecation_patterns {
            for entry in patterns {
                if entry.kind.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "deprecation pattern {:?} has an empty kind",
                        entry.pattern
                    )));
                }
                regex::Regex::new(&entry.pattern).map_err(|e| {
                    Error::Config(format!(
                        "invalid deprecation pattern {:?}: {}",
                        entry.pattern, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Apply command-line overrides; boolean switches only ever turn features off
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(filter) = overrides.filter {
            self.filter = filter;
        }
        if let Some(limit) = overrides.limit {
            self.limit = limit;
        }
        self.disable_validators |= overrides.disable_validators;
        self.disable_conformance_tests |= overrides.disable_conformance_tests;
        if overrides.label.is_some() {
            self.label = overrides.label;
        }
        if overrides.label_value.is_some() {
            self.label_value = overrides.label_value;
        }
        if let Some(workers) = overrides.worker_count {
            self.worker_count = workers;
        }
        if let Some(timeout) = overrides.bundle_timeout_secs {
            self.bundle_timeout_secs = timeout;
        }
        if let Some(tool) = overrides.container_tool {
            self.container_tool = tool;
        }
        if let Some(binary) = overrides.conformance_binary {
            self.conformance_binary = binary;
        }
        if overrides.kubeconfig.is_some() {
            self.kubeconfig = overrides.kubeconfig;
        }
        if overrides.scratch_root.is_some() {
            self.scratch_root = overrides.scratch_root;
        }
    }

    /// Package filter as an optional value
    pub fn package_filter(&self) -> Option<&str> {
        let filter = self.filter.trim();
        (!filter.is_empty()).then_some(filter)
    }

    /// Bundle cap as an optional value
    pub fn bundle_limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bootstrap configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load the TOML bootstrap file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config: TomlConfig = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    tracing::debug!(path = %path.display(), "Loaded TOML configuration");
    Ok(config)
}

/// Write a TOML configuration file (used to scaffold a starting config)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

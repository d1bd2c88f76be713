//! Platform version rules
//!
//! Deprecated Kubernetes APIs (the `v1beta1` group removed in Kubernetes 1.22)
//! stop being served on OpenShift 4.9. A bundle that uses them can still be
//! compliant in practice when its metadata pins it below that release. Two
//! metadata sources carry such a pin:
//!
//! - `olm.maxOpenShiftVersion` property: the highest release the bundle may be
//!   installed on
//! - `com.redhat.openshift.versions` annotation: the range of releases the
//!   bundle is published to
//!
//! # Annotation grammar
//! - `v4.6`        → 4.6 and every later release
//! - `v4.6,v4.7`   → legacy list form, also means 4.6 and later
//! - `v4.6-v4.8`   → 4.6 through 4.8
//! - `=v4.8`       → exactly 4.8

use crate::{Error, Result};
use std::fmt;

/// `major.minor` platform release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OcpVersion {
    pub major: u32,
    pub minor: u32,
}

/// First release on which the deprecated APIs are no longer served
pub const DEPRECATED_API_REMOVAL: OcpVersion = OcpVersion { major: 4, minor: 9 };

impl OcpVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `4.8`, `v4.8`, `4.8.3` or a JSON-quoted `"4.8"`
    ///
    /// Patch components are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('"').trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut parts = trimmed.split('.');

        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Parse(format!("empty platform version: {raw:?}")))?
            .parse::<u32>()
            .map_err(|e| Error::Parse(format!("invalid platform version {raw:?}: {e}")))?;
        let minor = parts
            .next()
            .ok_or_else(|| Error::Parse(format!("platform version without minor: {raw:?}")))?
            .parse::<u32>()
            .map_err(|e| Error::Parse(format!("invalid platform version {raw:?}: {e}")))?;

        Ok(Self { major, minor })
    }
}

impl fmt::Display for OcpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Releases a bundle declares itself installable on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupportedRange {
    pub min: Option<OcpVersion>,
    pub max: Option<OcpVersion>,
}

impl SupportedRange {
    /// Parse a `com.redhat.openshift.versions` annotation value
    pub fn from_label(label: &str) -> Result<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::Parse("empty platform label".to_string()));
        }

        if let Some(exact) = label.strip_prefix('=') {
            let version = OcpVersion::parse(exact)?;
            return Ok(Self {
                min: Some(version),
                max: Some(version),
            });
        }

        if label.contains(',') {
            let lowest = label
                .split(',')
                .map(OcpVersion::parse)
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .min();
            return Ok(Self {
                min: lowest,
                max: None,
            });
        }

        if let Some((low, high)) = label.split_once('-') {
            return Ok(Self {
                min: Some(OcpVersion::parse(low)?),
                max: Some(OcpVersion::parse(high)?),
            });
        }

        Ok(Self {
            min: Some(OcpVersion::parse(label)?),
            max: None,
        })
    }

    /// Effective range from both metadata sources
    ///
    /// Unparseable values contribute nothing.
    pub fn from_metadata(ocp_label: Option<&str>, max_ocp_version: Option<&str>) -> Self {
        let mut range = ocp_label
            .and_then(|l| Self::from_label(l).ok())
            .unwrap_or_default();

        if let Some(max) = max_ocp_version.and_then(|m| OcpVersion::parse(m).ok()) {
            range.max = Some(match range.max {
                Some(current) => current.min(max),
                None => max,
            });
        }
        range
    }

    /// True when the whole range lies below `boundary`
    pub fn is_below(&self, boundary: OcpVersion) -> bool {
        self.max.map(|m| m < boundary).unwrap_or(false)
    }
}

impl fmt::Display for SupportedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => write!(f, "={min}"),
            (Some(min), Some(max)) => write!(f, "{min}-{max}"),
            (Some(min), None) => write!(f, "{min}+"),
            (None, Some(max)) => write!(f, "<={max}"),
            (None, None) => f.write_str("any"),
        }
    }
}

/// `olm.maxOpenShiftVersion` pins the bundle below the removal boundary
pub fn max_version_mitigates(max_ocp_version: &str) -> bool {
    OcpVersion::parse(max_ocp_version)
        .map(|v| v < DEPRECATED_API_REMOVAL)
        .unwrap_or(false)
}

/// Platform label pins the bundle below the removal boundary
pub fn label_mitigates(ocp_label: &str) -> bool {
    SupportedRange::from_label(ocp_label)
        .map(|r| r.is_below(DEPRECATED_API_REMOVAL))
        .unwrap_or(false)
}

/// Either metadata source carries a mitigation signal
///
/// Absent or unparseable fields are not signals.
pub fn is_mitigated(max_ocp_version: Option<&str>, ocp_label: Option<&str>) -> bool {
    max_ocp_version.map(max_version_mitigates).unwrap_or(false)
        || ocp_label.map(label_mitigates).unwrap_or(false)
}

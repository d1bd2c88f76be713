//! Semantic version validation for declared bundle versions

use once_cell::sync::Lazy;
use regex::Regex;

static SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
    )
    .expect("semver pattern compiles")
});

/// True when `raw` is a strict semantic version (`MAJOR.MINOR.PATCH[-pre][+build]`)
///
/// A leading `v` is not accepted, matching how bundle manifests are expected
/// to declare `spec.version`.
pub fn is_valid_semver(raw: &str) -> bool {
    SEMVER.is_match(raw)
}

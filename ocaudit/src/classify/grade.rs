//! Package grade
//!
//! Weighted sum over independent axes. Every axis except the deprecated API
//! axis is evaluated against the package's head-of-channel bundles; a package
//! without head bundles scores zero on those axes.
//!
//! | Axis | Points |
//! |------|--------|
//! | Deprecated APIs | complying 30, partially 15, not 0 |
//! | Validators | clean 15, warnings only 10, errors or not run 0 |
//! | Conformance | all pass 15, failures only 7, errors or not run 0 |
//! | Channel naming | all recommended 10 |
//! | Multi-arch | two or more architectures 10 |
//! | SDK builder | built with operator-sdk 10 |
//! | Infrastructure features | declared 10 |
//!
//! Letters: A at 80, B at 60, C at 40, D below.

use super::ComplianceTier;
use ocaudit_common::models::{Bundle, ConformanceState, Package};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Recommended channel names, optionally with a `-suffix`
static RECOMMENDED_CHANNEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(alpha|beta|stable|candidate|fast|preview)(-[A-Za-z0-9._-]+)?$")
        .expect("channel name pattern compiles")
});

pub const SDK_BUILDER_PREFIX: &str = "operator-sdk";

/// What ran during enrichment; a disabled stage scores zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeContext {
    pub validators_ran: bool,
    pub conformance_ran: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisScore {
    pub axis: String,
    pub points: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageGrade {
    pub package_name: String,
    pub score: u32,
    pub letter: char,
    pub axes: Vec<AxisScore>,
}

pub fn is_recommended_channel(name: &str) -> bool {
    RECOMMENDED_CHANNEL.is_match(name)
}

pub fn letter_for(score: u32) -> char {
    match score {
        s if s >= 80 => 'A',
        s if s >= 60 => 'B',
        s if s >= 40 => 'C',
        _ => 'D',
    }
}

/// Grade one package given its tier
pub fn grade_package(package: &Package, tier: ComplianceTier, context: GradeContext) -> PackageGrade {
    let heads: Vec<&Bundle> = package.head_bundles().collect();

    let axes = vec![
        axis("deprecatedApis", deprecated_api_points(tier), 30),
        axis("validators", validator_points(&heads, context.validators_ran), 15),
        axis("conformance", conformance_points(&heads, context.conformance_ran), 15),
        axis("channelNaming", all_heads(&heads, channels_recommended, 10), 10),
        axis("multiArch", all_heads(&heads, |b| b.architectures.len() >= 2, 10), 10),
        axis(
            "sdkBuilder",
            all_heads(
                &heads,
                |b| {
                    b.builder
                        .as_deref()
                        .map(|v| v.starts_with(SDK_BUILDER_PREFIX))
                        .unwrap_or(false)
                },
                10,
            ),
            10,
        ),
        axis(
            "infrastructureFeatures",
            all_heads(
                &heads,
                |b| {
                    b.infrastructure_features
                        .as_deref()
                        .map(|v| !v.trim().is_empty() && v.trim() != "[]")
                        .unwrap_or(false)
                },
                10,
            ),
            10,
        ),
    ];

    let score = axes.iter().map(|a| a.points).sum();
    PackageGrade {
        package_name: package.name.clone(),
        score,
        letter: letter_for(score),
        axes,
    }
}

fn axis(name: &str, points: u32, max: u32) -> AxisScore {
    AxisScore {
        axis: name.to_string(),
        points,
        max,
    }
}

fn deprecated_api_points(tier: ComplianceTier) -> u32 {
    match tier {
        ComplianceTier::Complying => 30,
        ComplianceTier::PartiallyComplying => 15,
        ComplianceTier::NotComplying => 0,
    }
}

fn all_heads(heads: &[&Bundle], check: impl Fn(&Bundle) -> bool, points: u32) -> u32 {
    if !heads.is_empty() && heads.iter().all(|b| check(*b)) {
        points
    } else {
        0
    }
}

fn channels_recommended(bundle: &Bundle) -> bool {
    !bundle.channels.is_empty() && bundle.channels.iter().all(|c| is_recommended_channel(c))
}

fn validator_points(heads: &[&Bundle], ran: bool) -> u32 {
    if !ran || heads.is_empty() {
        return 0;
    }
    if heads.iter().any(|b| b.has_validator_errors()) {
        0
    } else if heads.iter().any(|b| b.has_validator_warnings()) {
        10
    } else {
        15
    }
}

fn conformance_points(heads: &[&Bundle], ran: bool) -> u32 {
    if !ran || heads.is_empty() {
        return 0;
    }
    let mut any_failed = false;
    for bundle in heads {
        let Some(results) = bundle.conformance_results.as_ref().filter(|r| !r.is_empty()) else {
            return 0;
        };
        for result in results {
            match result.state {
                ConformanceState::Error => return 0,
                ConformanceState::Fail => any_failed = true,
                ConformanceState::Pass => {}
            }
        }
    }
    if any_failed {
        7
    } else {
        15
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocaudit_common::models::{ConformanceResult, MessageLevel, ValidatorMessage};

    fn head(name: &str) -> Bundle {
        let mut bundle = Bundle::new(name, "img");
        bundle.is_head_of_channel = true;
        bundle.channels.insert("stable".to_string());
        bundle
    }

    fn package(bundles: Vec<Bundle>) -> Package {
        let mut package = Package::new("etcd", "stable");
        package.bundles = bundles;
        package
    }

    const ALL_RAN: GradeContext = GradeContext {
        validators_ran: true,
        conformance_ran: true,
    };

    #[test]
    fn test_recommended_channels() {
        assert!(is_recommended_channel("stable"));
        assert!(is_recommended_channel("stable-v1.2"));
        assert!(is_recommended_channel("fast-4.9"));
        assert!(!is_recommended_channel("latest"));
        assert!(!is_recommended_channel("stablev1"));
    }

    #[test]
    fn test_full_marks() {
        let mut b = head("etcd.v1");
        b.architectures = vec!["amd64".to_string(), "arm64".to_string()];
        b.builder = Some("operator-sdk-v1.22.0".to_string());
        b.infrastructure_features = Some(r#"["disconnected"]"#.to_string());
        b.conformance_results = Some(vec![ConformanceResult {
            name: "basic-check-spec".to_string(),
            state: ConformanceState::Pass,
            errors: vec![],
        }]);

        let grade = grade_package(&package(vec![b]), ComplianceTier::Complying, ALL_RAN);
        assert_eq!(grade.score, 100);
        assert_eq!(grade.letter, 'A');
        assert_eq!(grade.axes.len(), 7);
    }

    #[test]
    fn test_warnings_and_failed_tests() {
        let mut b = head("etcd.v1");
        b.validator_messages.push(ValidatorMessage {
            validator: "operatorhub".to_string(),
            level: MessageLevel::Warning,
            message: "csv.Spec.Description not specified".to_string(),
        });
        b.conformance_results = Some(vec![ConformanceResult {
            name: "olm-bundle-validation".to_string(),
            state: ConformanceState::Fail,
            errors: vec!["bad".to_string()],
        }]);

        let grade = grade_package(&package(vec![b]), ComplianceTier::PartiallyComplying, ALL_RAN);
        // 15 + 10 + 7 + 10 (channel naming)
        assert_eq!(grade.score, 42);
        assert_eq!(grade.letter, 'C');
    }

    #[test]
    fn test_disabled_stages_and_no_heads_score_zero() {
        let mut b = head("etcd.v1");
        b.is_head_of_channel = false;
        let context = GradeContext {
            validators_ran: false,
            conformance_ran: false,
        };
        let grade = grade_package(&package(vec![b]), ComplianceTier::NotComplying, context);
        assert_eq!(grade.score, 0);
        assert_eq!(grade.letter, 'D');
    }
}

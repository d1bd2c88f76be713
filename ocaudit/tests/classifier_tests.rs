//! Compliance classifier tests over hand-built models

use ocaudit::classify::{bundle_token, classify, tier_for, DeprecationPatternTable};
use ocaudit::validators::deprecated_api_validator::{removal_message, VALIDATOR_NAME};
use ocaudit::ComplianceTier;
use ocaudit_common::models::{Bundle, MessageLevel, Package, ValidatorMessage};

fn bundle(package: &str, name: &str, head: bool, kinds: &[&str]) -> Bundle {
    let mut bundle = Bundle::new(name, format!("quay.io/test/{name}:latest"));
    bundle.package_name = package.to_string();
    bundle.default_channel = "stable".to_string();
    bundle.channels.insert("stable".to_string());
    bundle.is_head_of_channel = head;
    bundle.deprecated_api_kinds = kinds.iter().map(|k| k.to_string()).collect();
    bundle
}

fn package(name: &str, bundles: Vec<Bundle>) -> Package {
    let mut package = Package::new(name, "stable");
    package.bundles = bundles;
    package
}

#[test]
fn test_migrated_head_makes_package_complying() {
    let packages = vec![package(
        "P1",
        vec![
            bundle("P1", "P1-v0", false, &["Ingress"]),
            bundle("P1", "P1-v1", true, &[]),
        ],
    )];

    let classification = classify(&packages);
    let p1 = &classification.complying["P1"];
    assert_eq!(p1.deprecated_api_kinds.iter().cloned().collect::<Vec<_>>(), vec!["Ingress"]);
    assert_eq!(
        p1.migrated_bundles,
        vec!["P1-v1 - (label=none,range=any,channels=[stable],head:YES)".to_string()]
    );
    assert_eq!(
        p1.unmigrated_bundles,
        vec!["P1-v0 - (label=none,range=any,channels=[stable],head:NO)".to_string()]
    );
    assert_eq!(p1.default_channel, "stable");
}

#[test]
fn test_unmitigated_head_with_removed_api_is_not_complying() {
    let packages = vec![package("P2", vec![bundle("P2", "P2-v1", true, &["Ingress"])])];

    let classification = classify(&packages);
    assert_eq!(classification.tier_of("P2"), Some(ComplianceTier::NotComplying));
    assert!(classification.not_complying["P2"].migrated_bundles.is_empty());
}

#[test]
fn test_mitigated_head_beside_migrated_bundle_is_partial() {
    let mut head = bundle("P2", "P2-v1", true, &["Ingress"]);
    head.ocp_label = Some("v4.6-v4.8".to_string());
    let packages = vec![package("P2", vec![bundle("P2", "P2-v0", false, &[]), head])];

    let classification = classify(&packages);
    assert_eq!(classification.tier_of("P2"), Some(ComplianceTier::PartiallyComplying));
    assert!(classification.partially_complying["P2"].unmigrated_bundles[0]
        .starts_with("P2-v1 - (label=v4.6-v4.8,range=4.6-4.8,"));
}

#[test]
fn test_every_bundle_migrated_is_complying_without_heads() {
    let packages = vec![package(
        "quiet",
        vec![bundle("quiet", "quiet.v1", false, &[]), bundle("quiet", "quiet.v2", false, &[])],
    )];
    assert_eq!(classify(&packages).tier_of("quiet"), Some(ComplianceTier::Complying));
}

#[test]
fn test_deprecated_migrated_head_does_not_count() {
    let mut head = bundle("P3", "P3-v2", true, &[]);
    head.is_deprecated = true;
    let bundles = vec![bundle("P3", "P3-v1", false, &["CustomResourceDefinition"]), head];
    let refs: Vec<&Bundle> = bundles.iter().collect();
    assert_eq!(tier_for(&refs), ComplianceTier::PartiallyComplying);
}

#[test]
fn test_uniform_mitigation_is_not_complying() {
    let mut v1 = bundle("legacy", "legacy.v1", false, &["CustomResourceDefinition"]);
    v1.max_ocp_version = Some("4.8".to_string());
    let mut v2 = bundle("legacy", "legacy.v2", true, &["CustomResourceDefinition"]);
    v2.ocp_label = Some("=v4.7".to_string());

    let all_mitigated = vec![v1.clone(), v2.clone()];
    let refs: Vec<&Bundle> = all_mitigated.iter().collect();
    assert_eq!(tier_for(&refs), ComplianceTier::NotComplying);

    // One unmitigated bundle among mitigated ones is partial
    let mut v3 = bundle("legacy", "legacy.v3", false, &["Ingress"]);
    v3.ocp_label = Some("v4.6".to_string());
    let mixed = vec![v1, v2, v3];
    let refs: Vec<&Bundle> = mixed.iter().collect();
    assert_eq!(tier_for(&refs), ComplianceTier::PartiallyComplying);
}

#[test]
fn test_packages_land_in_exactly_one_tier() {
    let mut mitigated = bundle("c", "c.v1", true, &["Lease"]);
    mitigated.max_ocp_version = Some("4.8".to_string());
    let packages = vec![
        package("a", vec![bundle("a", "a.v1", true, &[])]),
        package("b", vec![bundle("b", "b.v1", true, &["Lease"])]),
        package("c", vec![mitigated, bundle("c", "c.v0", false, &[])]),
        package("d", vec![bundle("d", "d.v1", false, &["RBAC"]), bundle("d", "d.v2", true, &[])]),
    ];

    let classification = classify(&packages);
    assert_eq!(classification.len(), packages.len());
    for p in &packages {
        let hits = [
            classification.complying.contains_key(&p.name),
            classification.partially_complying.contains_key(&p.name),
            classification.not_complying.contains_key(&p.name),
        ]
        .iter()
        .filter(|hit| **hit)
        .count();
        assert_eq!(hits, 1, "package {} in {hits} tiers", p.name);
    }
}

#[test]
fn test_split_package_records_are_merged() {
    let packages = vec![
        package("split", vec![bundle("split", "split.v1", false, &["Ingress"])]),
        package("split", vec![bundle("split", "split.v2", true, &[])]),
        package("", vec![bundle("", "orphan", true, &["Ingress"])]),
    ];

    let classification = classify(&packages);
    assert_eq!(classification.len(), 1);
    let split = &classification.complying["split"];
    assert_eq!(split.migrated_bundles.len(), 1);
    assert_eq!(split.unmigrated_bundles.len(), 1);
}

#[test]
fn test_classification_is_order_independent_and_stable() {
    let forward = vec![
        package(
            "etcd",
            vec![bundle("etcd", "etcd.v1", false, &["Ingress"]), bundle("etcd", "etcd.v2", true, &[])],
        ),
        package("zk", vec![bundle("zk", "zk.v1", true, &["Lease", "APIService"])]),
    ];
    let mut reversed = forward.clone();
    reversed.reverse();
    for p in &mut reversed {
        p.bundles.reverse();
    }

    let first = serde_json::to_string(&classify(&forward)).unwrap();
    let second = serde_json::to_string(&classify(&forward)).unwrap();
    let shuffled = serde_json::to_string(&classify(&reversed)).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, shuffled);
}

#[test]
fn test_removal_messages_map_to_kinds() {
    let table = DeprecationPatternTable::default();
    let messages: Vec<ValidatorMessage> = [
        removal_message("CustomResourceDefinition", ["things.example.com"]),
        removal_message("ClusterRoleBinding", ["admin"]),
        "spec.description is empty".to_string(),
    ]
    .into_iter()
    .map(|message| ValidatorMessage {
        validator: VALIDATOR_NAME.to_string(),
        level: MessageLevel::Warning,
        message,
    })
    .collect();

    let kinds: Vec<String> = table.kinds_for(&messages).into_iter().collect();
    assert_eq!(kinds, vec!["CustomResourceDefinition".to_string(), "RBAC".to_string()]);
}

#[test]
fn test_token_shows_max_version_range() {
    let mut b = bundle("etcd", "etcd.v0.9.2", false, &["Ingress"]);
    b.max_ocp_version = Some("4.8".to_string());
    assert_eq!(
        bundle_token(&b),
        "etcd.v0.9.2 - (label=none,range=<=4.8,channels=[stable],head:NO)"
    );
}

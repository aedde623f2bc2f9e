// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for security-group installation.

use super::*;
use crate::fake::FakeCompute;

#[tokio::test]
async fn creates_group_with_all_rules_when_missing() {
    let api = FakeCompute::new();

    let group = ensure_security_group(&api).await.unwrap();

    assert_eq!(group.name, SECURITY_GROUP_NAME);
    let stored = api.security_group(SECURITY_GROUP_NAME).unwrap();
    assert_eq!(stored.rules.len(), 3);
    for rule in required_rules() {
        assert!(stored.rules.contains(&rule), "missing rule {rule:?}");
    }
}

#[tokio::test]
async fn only_adds_missing_rules_to_existing_group() {
    let api = FakeCompute::new();
    ensure_security_group(&api).await.unwrap();
    let before = api.security_group(SECURITY_GROUP_NAME).unwrap().rules.len();

    // Second ensure is a no-op: same group, no duplicated rules.
    ensure_security_group(&api).await.unwrap();
    let after = api.security_group(SECURITY_GROUP_NAME).unwrap();
    assert_eq!(after.rules.len(), before);
    assert_eq!(api.security_group_count(), 1);
}

#[tokio::test]
async fn never_removes_or_widens_existing_rules() {
    let api = FakeCompute::new();
    let group = api.create_security_group(SECURITY_GROUP_NAME, "pre-existing").await.unwrap();
    // Drop one required rule and keep a custom one the operator added.
    let custom = SecurityGroupRule {
        direction: RuleDirection::Egress,
        protocol: RuleProtocol::Tcp,
        port: Some(443),
        ethertype: "IPv4",
    };
    api.add_security_group_rule(&group.id, custom.clone()).await.unwrap();

    ensure_security_group(&api).await.unwrap();

    let stored = api.security_group(SECURITY_GROUP_NAME).unwrap();
    assert!(stored.rules.contains(&custom), "custom rule must be left alone");
    assert_eq!(stored.rules.len(), 4);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security group for runner VMs.
//!
//! The group name is versioned: incompatible rule changes get a new group
//! instead of mutating the old one, so the group is never widened once
//! installed.

use super::compute::{
    ComputeApi, ComputeError, RuleDirection, RuleProtocol, SecurityGroupRecord, SecurityGroupRule,
};

pub const SECURITY_GROUP_NAME: &str = "runner-v1";
const SECURITY_GROUP_DESCRIPTION: &str = "For servers managed by the runner-fleet manager.";

/// The exact rule set the group must carry: ping, inbound SSH, and the
/// outbound debug-SSH port.
pub fn required_rules() -> [SecurityGroupRule; 3] {
    [
        SecurityGroupRule {
            direction: RuleDirection::Ingress,
            protocol: RuleProtocol::Icmp,
            port: None,
            ethertype: "IPv4",
        },
        SecurityGroupRule {
            direction: RuleDirection::Ingress,
            protocol: RuleProtocol::Tcp,
            port: Some(22),
            ethertype: "IPv4",
        },
        SecurityGroupRule {
            direction: RuleDirection::Egress,
            protocol: RuleProtocol::Tcp,
            port: Some(10022),
            ethertype: "IPv4",
        },
    ]
}

/// Ensure the group exists with exactly the required rules, creating only
/// what is missing. Idempotent; safe to re-enter.
pub async fn ensure_security_group<C: ComputeApi>(
    api: &C,
) -> Result<SecurityGroupRecord, ComputeError> {
    let group = match api.find_security_group(SECURITY_GROUP_NAME).await? {
        Some(group) => group,
        None => {
            tracing::info!(group = SECURITY_GROUP_NAME, "security group not found, creating it");
            api.create_security_group(SECURITY_GROUP_NAME, SECURITY_GROUP_DESCRIPTION).await?
        }
    };

    for rule in required_rules() {
        let present = group.rules.iter().any(|existing| {
            existing.direction == rule.direction
                && existing.protocol == rule.protocol
                && existing.port == rule.port
        });
        if !present {
            api.add_security_group_rule(&group.id, rule).await?;
        }
    }
    Ok(group)
}

#[cfg(test)]
#[path = "secgroup_tests.rs"]
mod tests;

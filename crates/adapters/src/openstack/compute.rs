// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal compute-API seam the cloud layer is written against.
//!
//! The concrete OpenStack SDK transport implements this trait; everything
//! the reconciler needs from the cloud is expressed through it, which keeps
//! the keypair / security-group / unique-name protocol testable in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("compute api error: {0}")]
    Api(String),
    #[error("compute resource timed out")]
    Timeout,
}

/// A server as the compute API reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub addresses: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Everything needed to create one server.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateServerSpec {
    pub name: String,
    pub image: String,
    pub flavor: String,
    pub network: String,
    pub key_name: String,
    pub security_group_id: String,
    pub user_data: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeypairRecord {
    pub name: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDirection {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleProtocol {
    Icmp,
    Tcp,
}

/// One security-group rule; `port` is a single port, not a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRule {
    pub direction: RuleDirection,
    pub protocol: RuleProtocol,
    pub port: Option<u16>,
    pub ethertype: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupRecord {
    pub id: String,
    pub name: String,
    pub rules: Vec<SecurityGroupRule>,
}

/// Raw compute operations. Implementations perform no protocol logic.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn create_server(&self, spec: CreateServerSpec) -> Result<ServerRecord, ComputeError>;

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, ComputeError>;

    /// Servers whose name equals `name` exactly; the cloud may hold several.
    async fn search_servers(&self, name: &str) -> Result<Vec<ServerRecord>, ComputeError>;

    async fn delete_server(&self, server_id: &str) -> Result<(), ComputeError>;

    async fn create_keypair(&self, name: &str) -> Result<KeypairRecord, ComputeError>;

    /// Returns whether a keypair was actually removed.
    async fn delete_keypair(&self, name: &str) -> Result<bool, ComputeError>;

    async fn list_keypairs(&self) -> Result<Vec<String>, ComputeError>;

    async fn find_security_group(
        &self,
        name: &str,
    ) -> Result<Option<SecurityGroupRecord>, ComputeError>;

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<SecurityGroupRecord, ComputeError>;

    async fn add_security_group_rule(
        &self,
        group_id: &str,
        rule: SecurityGroupRule,
    ) -> Result<(), ComputeError>;
}

//! Assignment store: durable records of pools and every range handed out.
//!
//! The store owns identity and durability, nothing else. Records are typed
//! per table and serialize with the attribute names used by existing state
//! (`account-ou-key`, `vpc-name`, `subnet-name`, ...), so state written by
//! earlier pipeline runs can be read back unchanged.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`]: in-process, used by tests and `--dry-run`
//! - [`JsonFileStore`]: one JSON file per table in a state directory,
//!   guarded by a lock file and retrying transient I/O errors

pub mod json_file;
pub mod memory;
pub mod retry;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Requester recorded on every assignment written by this tool
pub const REQUESTER: &str = "system";

/// Owner key for ranges assigned to an account
pub fn account_owner_key(account_key: &str) -> String {
    format!("account/{}", account_key)
}

/// Owner key for ranges assigned to every account of an organizational unit
pub fn ou_owner_key(ou_key: &str) -> String {
    format!("organizational-unit/{}", ou_key)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State directory is locked by another run: {} (remove it if no run is active)", .path.display())]
    Locked { path: PathBuf },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Assigned,
}

/// A named, region-scoped base range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub id: String,
    pub pool: String,
    pub region: String,
    pub cidr: String,
}

/// A range assigned to a VPC out of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VpcAssignment {
    pub id: Uuid,
    pub pool: String,
    pub region: String,
    pub vpc_name: String,
    #[serde(rename = "account-ou-key")]
    pub owner_key: String,
    /// Written by older pipeline versions alongside `account-ou-key`
    #[serde(default, alias = "account-Key", skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    pub cidr: String,
    pub requester: String,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_assigned_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl VpcAssignment {
    pub fn is_owned_by_account(&self, account_key: &str) -> bool {
        self.account_key.as_deref() == Some(account_key) || self.owner_key == account_owner_key(account_key)
    }
}

/// A range assigned to one subnet in one availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubnetAssignment {
    pub id: Uuid,
    pub region: String,
    pub vpc_name: String,
    pub subnet_name: String,
    pub az: String,
    #[serde(rename = "sub-pool", alias = "subnet-pool")]
    pub pool: String,
    pub cidr: String,
    #[serde(rename = "account-ou-key")]
    pub owner_key: String,
    #[serde(default, alias = "account-Key", skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    pub requester: String,
    pub status: AssignmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl SubnetAssignment {
    pub fn is_owned_by_account(&self, account_key: &str) -> bool {
        self.account_key.as_deref() == Some(account_key) || self.owner_key == account_owner_key(account_key)
    }
}

/// Lookup identity of a VPC assignment
#[derive(Debug, Clone, Copy)]
pub struct VpcKey<'a> {
    pub region: &'a str,
    pub vpc_name: &'a str,
    pub pool: &'a str,
    pub account_key: &'a str,
}

/// Lookup identity of a subnet assignment
#[derive(Debug, Clone, Copy)]
pub struct SubnetKey<'a> {
    pub region: &'a str,
    pub vpc_name: &'a str,
    pub subnet_name: &'a str,
    pub az: &'a str,
    pub account_key: &'a str,
}

/// Durable tables of pools and assignments.
///
/// Writers must be exclusive: two runs writing a brand-new identity at the
/// same time is last-writer-wins.
pub trait AssignmentStore {
    fn pools(&self) -> StoreResult<Vec<PoolRecord>>;

    fn put_pool(&mut self, pool: PoolRecord) -> StoreResult<()>;

    fn vpc_assignments(&self) -> StoreResult<Vec<VpcAssignment>>;

    fn put_vpc_assignment(&mut self, assignment: VpcAssignment) -> StoreResult<()>;

    fn subnet_assignments(&self) -> StoreResult<Vec<SubnetAssignment>>;

    fn put_subnet_assignment(&mut self, assignment: SubnetAssignment) -> StoreResult<()>;

    fn find_vpc_assignment(&self, key: VpcKey<'_>) -> StoreResult<Option<VpcAssignment>> {
        Ok(self.vpc_assignments()?.into_iter().find(|a| {
            a.region == key.region
                && a.vpc_name == key.vpc_name
                && a.pool == key.pool
                && a.is_owned_by_account(key.account_key)
        }))
    }

    fn find_subnet_assignment(&self, key: SubnetKey<'_>) -> StoreResult<Option<SubnetAssignment>> {
        Ok(self.subnet_assignments()?.into_iter().find(|a| {
            a.region == key.region
                && a.vpc_name == key.vpc_name
                && a.subnet_name == key.subnet_name
                && a.az == key.az
                && a.is_owned_by_account(key.account_key)
        }))
    }

    /// Every VPC range ever handed out of `(pool, region)`, whatever the owner
    fn used_vpc_cidrs(&self, pool: &str, region: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .vpc_assignments()?
            .into_iter()
            .filter(|a| a.pool == pool && a.region == region)
            .map(|a| a.cidr)
            .collect())
    }

    /// Every subnet range ever handed out inside VPCs named `vpc_name` in `region`
    fn used_subnet_cidrs(&self, vpc_name: &str, region: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .subnet_assignments()?
            .into_iter()
            .filter(|a| a.vpc_name == vpc_name && a.region == region)
            .map(|a| a.cidr)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpc_assignment_field_names() {
        let assignment = VpcAssignment {
            id: Uuid::nil(),
            pool: "main".to_string(),
            region: "ca-central-1".to_string(),
            vpc_name: "Endpoint".to_string(),
            owner_key: account_owner_key("shared-network"),
            account_key: Some("shared-network".to_string()),
            cidr: "10.7.0.0/22".to_string(),
            requester: REQUESTER.to_string(),
            status: AssignmentStatus::Assigned,
            vpc_assigned_id: None,
            assigned_at: None,
        };

        let value = serde_json::to_value(&assignment).unwrap();
        assert_eq!(value["account-ou-key"], "account/shared-network");
        assert_eq!(value["vpc-name"], "Endpoint");
        assert_eq!(value["account-key"], "shared-network");
        assert_eq!(value["status"], "assigned");
        assert!(value.get("assigned-at").is_none());
    }

    #[test]
    fn test_legacy_subnet_record_parses() {
        let json = r#"{
            "id": "6f1c1a52-4b0e-4f7c-9a59-6c7c1e0b6d11",
            "region": "ca-central-1",
            "vpc-name": "Endpoint",
            "subnet-name": "App",
            "az": "a",
            "subnet-pool": "main",
            "cidr": "10.7.0.0/24",
            "account-ou-key": "account/shared-network",
            "account-Key": "shared-network",
            "requester": "Accelerator",
            "status": "assigned"
        }"#;

        let record: SubnetAssignment = serde_json::from_str(json).unwrap();
        assert_eq!(record.pool, "main");
        assert_eq!(record.account_key.as_deref(), Some("shared-network"));
        assert!(record.is_owned_by_account("shared-network"));
        assert!(!record.is_owned_by_account("perimeter"));
    }

    #[test]
    fn test_legacy_account_key_matches_without_owner_key() {
        let json = r#"{
            "id": "0b8e9d1e-5a43-4f57-8a2c-2c7e0f2a9b10",
            "pool": "main",
            "region": "ca-central-1",
            "vpc-name": "Endpoint",
            "account-ou-key": "organizational-unit/core",
            "account-Key": "shared-network",
            "cidr": "10.7.0.0/22",
            "requester": "Accelerator",
            "status": "assigned",
            "vpc-assigned-id": 3
        }"#;

        let record: VpcAssignment = serde_json::from_str(json).unwrap();
        assert!(record.is_owned_by_account("shared-network"));
        assert_eq!(record.vpc_assigned_id, Some(3));
    }
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::cidr;
use crate::store::RetryPolicy;

static REGION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]?)?-[a-z]+-\d+$").expect("Invalid region regex"));

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("Invalid name regex"));

/// Where a VPC's address ranges come from
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CidrSource {
    /// Literal ranges written in the configuration
    #[default]
    Provided,
    /// Ranges assigned earlier, possibly to the account's organizational unit
    Lookup,
    /// Ranges carved out of a cidr pool on first request
    Dynamic,
}

/// Top-level configuration file
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub store: RetryPolicy,
    #[serde(default)]
    pub cidr_pools: Vec<CidrPoolConfig>,
    #[serde(default)]
    pub vpcs: Vec<VpcConfig>,
}

/// One base range per pool per region
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CidrPoolConfig {
    pub pool: String,
    pub region: String,
    pub cidr: String,
}

fn default_pool() -> String {
    "main".to_string()
}

/// A range request: either a prefix length out of a pool, or a literal value
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CidrConfig {
    #[serde(default = "default_pool")]
    pub pool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubnetDefinitionConfig {
    pub az: String,
    pub cidr: CidrConfig,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubnetConfig {
    pub name: String,
    pub definitions: Vec<SubnetDefinitionConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct VpcConfig {
    /// Account the VPC is deployed into
    pub account: String,
    /// Organizational unit the VPC was declared under, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ou: Option<String>,
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub cidr_src: CidrSource,
    #[serde(default)]
    pub cidr: Vec<CidrConfig>,
    #[serde(default)]
    pub subnets: Vec<SubnetConfig>,
}

impl VpcConfig {
    /// `region/name`, the way VPCs are named in messages
    pub fn label(&self) -> String {
        format!("{}/{}", self.region, self.name)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid cidr pool configuration: {0}")]
    InvalidPool(String),
    #[error("Invalid VPC configuration: {0}")]
    InvalidVpc(String),
    #[error("Invalid subnet configuration: {0}")]
    InvalidSubnet(String),
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen_pools = HashSet::new();
        for pool in &self.cidr_pools {
            if !NAME_PATTERN.is_match(&pool.pool) {
                return Err(ValidationError::InvalidPool(format!("invalid pool name '{}'", pool.pool)));
            }
            if !REGION_PATTERN.is_match(&pool.region) {
                return Err(ValidationError::InvalidPool(format!(
                    "invalid region '{}' for pool '{}'",
                    pool.region, pool.pool
                )));
            }
            if let Err(e) = cidr::parse(&pool.cidr) {
                return Err(ValidationError::InvalidPool(format!("pool '{}': {}", pool.pool, e)));
            }
            if !seen_pools.insert((pool.pool.as_str(), pool.region.as_str())) {
                return Err(ValidationError::InvalidPool(format!(
                    "pool '{}' is declared twice for region {}",
                    pool.pool, pool.region
                )));
            }
        }

        for vpc in &self.vpcs {
            Self::validate_vpc(vpc)?;
        }

        Ok(())
    }

    fn validate_vpc(vpc: &VpcConfig) -> Result<(), ValidationError> {
        if vpc.name.trim().is_empty() {
            return Err(ValidationError::InvalidVpc("VPC name cannot be empty".to_string()));
        }
        if !NAME_PATTERN.is_match(&vpc.account) {
            return Err(ValidationError::InvalidVpc(format!(
                "VPC '{}' has invalid account key '{}'",
                vpc.name, vpc.account
            )));
        }
        if !REGION_PATTERN.is_match(&vpc.region) {
            return Err(ValidationError::InvalidVpc(format!(
                "VPC '{}' has invalid region '{}'",
                vpc.name, vpc.region
            )));
        }

        match vpc.cidr_src {
            CidrSource::Dynamic => {
                if vpc.cidr.is_empty() {
                    return Err(ValidationError::InvalidVpc(format!(
                        "VPC '{}' is cidr-src dynamic but requests no pool",
                        vpc.label()
                    )));
                }
                for request in &vpc.cidr {
                    Self::validate_size(request).map_err(|e| {
                        ValidationError::InvalidVpc(format!("VPC '{}': {}", vpc.label(), e))
                    })?;
                }
                for subnet in &vpc.subnets {
                    for def in &subnet.definitions {
                        Self::validate_size(&def.cidr).map_err(|e| {
                            ValidationError::InvalidSubnet(format!(
                                "{}/{}/{}: {}",
                                vpc.label(),
                                subnet.name,
                                def.az,
                                e
                            ))
                        })?;
                    }
                }
            }
            CidrSource::Provided => {
                for request in &vpc.cidr {
                    if request.value.is_none() {
                        return Err(ValidationError::InvalidVpc(format!(
                            "VPC '{}' is cidr-src provided but pool '{}' has no value",
                            vpc.label(),
                            request.pool
                        )));
                    }
                }
            }
            CidrSource::Lookup => {}
        }

        Ok(())
    }

    fn validate_size(request: &CidrConfig) -> Result<(), String> {
        match request.size {
            None => Err(format!("pool '{}' request has no size", request.pool)),
            Some(size) if size > 32 => Err(format!("size /{} is not an IPv4 prefix length", size)),
            Some(_) => Ok(()),
        }
    }

    /// VPCs in configuration order, which is also allocation order
    pub fn vpcs_with_source(&self, source: CidrSource) -> impl Iterator<Item = &VpcConfig> {
        self.vpcs.iter().filter(move |v| v.cidr_src == source)
    }
}

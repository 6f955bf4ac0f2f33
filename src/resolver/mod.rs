//! VPC and subnet range resolution.
//!
//! Every resolver follows the same discipline: look the identity up in the
//! store first and reuse what is there; only on a miss run the allocator,
//! then persist before moving on. A rerun of a failed pass therefore hands
//! every VPC and subnet the range it got the first time.
//!
//! - `vpc`: one range per requested pool for `cidr-src: dynamic` VPCs
//! - `subnet`: one range per subnet definition, carved out of the VPC range
//! - `lookup`: `cidr-src: lookup` VPCs, which only ever read (and copy
//!   organizational-unit records down to the account)
//!
//! `cidr-src: provided` VPCs are passed through with their literal ranges.

pub mod lookup;
pub mod subnet;
pub mod vpc;

use ipnet::Ipv4Net;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::PoolCatalog;
use crate::cidr;
use crate::config::{CidrSource, VpcConfig};
use crate::error::{CidrError, Result};
use crate::store::AssignmentStore;

pub use lookup::resolve_lookup_vpc;
pub use subnet::resolve_subnet_ranges;
pub use vpc::resolve_vpc_ranges;

/// How a range was obtained during this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Newly carved out and persisted
    Allocated,
    /// Found in the store under the same identity
    Reused,
    /// Literal value from the configuration
    Provided,
    /// Found in the store for a `cidr-src: lookup` VPC
    LookedUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    pub cidr: Ipv4Net,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSubnet {
    pub name: String,
    pub az: String,
    pub pool: String,
    pub cidr: Ipv4Net,
    pub origin: Origin,
}

/// Everything resolved for one VPC entry of the configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedVpc {
    pub account: String,
    pub name: String,
    pub region: String,
    pub cidr_src: CidrSource,
    /// Pool tag to VPC range
    pub pools: BTreeMap<String, ResolvedRange>,
    pub subnets: Vec<ResolvedSubnet>,
}

impl ResolvedVpc {
    fn empty(vpc: &VpcConfig) -> Self {
        Self {
            account: vpc.account.clone(),
            name: vpc.name.clone(),
            region: vpc.region.clone(),
            cidr_src: vpc.cidr_src,
            pools: BTreeMap::new(),
            subnets: Vec::new(),
        }
    }

    pub fn cidr(&self, pool: &str) -> Option<Ipv4Net> {
        self.pools.get(pool).map(|r| r.cidr)
    }

    pub fn subnet_cidr(&self, name: &str, az: &str) -> Option<Ipv4Net> {
        self.subnets.iter().find(|s| s.name == name && s.az == az).map(|s| s.cidr)
    }

    /// Number of ranges newly allocated for this VPC in this pass
    pub fn allocations(&self) -> usize {
        let vpc = self.pools.values().filter(|r| r.origin == Origin::Allocated).count();
        let subnets = self.subnets.iter().filter(|s| s.origin == Origin::Allocated).count();
        vpc + subnets
    }
}

/// Parse stored range strings, failing on the first malformed one
pub(crate) fn parse_ranges(values: Vec<String>) -> Result<Vec<Ipv4Net>> {
    values.iter().map(|v| cidr::parse(v)).collect()
}

/// Resolve one VPC entry according to its `cidr-src`
pub fn resolve_vpc(store: &mut dyn AssignmentStore, catalog: &PoolCatalog, vpc: &VpcConfig) -> Result<ResolvedVpc> {
    match vpc.cidr_src {
        CidrSource::Provided => resolve_provided_vpc(vpc),
        CidrSource::Lookup => resolve_lookup_vpc(store, vpc),
        CidrSource::Dynamic => {
            let mut resolved = ResolvedVpc::empty(vpc);
            resolved.pools = resolve_vpc_ranges(store, catalog, vpc)?;
            resolved.subnets = resolve_subnet_ranges(store, vpc, &resolved.pools)?;
            Ok(resolved)
        }
    }
}

/// Pass literal ranges through, checking that they parse
pub fn resolve_provided_vpc(vpc: &VpcConfig) -> Result<ResolvedVpc> {
    let mut resolved = ResolvedVpc::empty(vpc);

    for request in &vpc.cidr {
        let Some(value) = &request.value else {
            continue;
        };
        resolved.pools.insert(
            request.pool.clone(),
            ResolvedRange {
                cidr: cidr::parse(value)?,
                origin: Origin::Provided,
            },
        );
    }

    for subnet in &vpc.subnets {
        for def in &subnet.definitions {
            match &def.cidr.value {
                Some(value) => resolved.subnets.push(ResolvedSubnet {
                    name: subnet.name.clone(),
                    az: def.az.clone(),
                    pool: def.cidr.pool.clone(),
                    cidr: cidr::parse(value)?,
                    origin: Origin::Provided,
                }),
                None => debug!(
                    "Subnet {}/{}/{} has no provided value, leaving it out",
                    vpc.label(),
                    subnet.name,
                    def.az
                ),
            }
        }
    }

    Ok(resolved)
}

/// Prefix length of a dynamic request, which validation guarantees is present
pub(crate) fn requested_prefix(size: Option<u8>, what: impl FnOnce() -> String) -> Result<u8> {
    size.ok_or_else(|| CidrError::MissingPrefix { what: what() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_provided_vpc_passes_values_through() {
        let yaml = r#"
vpcs:
  - account: perimeter
    name: Perimeter
    region: ca-central-1
    cidr:
      - value: 10.7.4.0/22
      - pool: RFC6598a
        value: 100.96.250.0/23
    subnets:
      - name: Public
        definitions:
          - az: a
            cidr:
              value: 100.96.250.0/26
          - az: b
            cidr:
              size: 26
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let resolved = resolve_provided_vpc(&config.vpcs[0]).unwrap();

        assert_eq!(resolved.cidr("main").unwrap().to_string(), "10.7.4.0/22");
        assert_eq!(resolved.cidr("RFC6598a").unwrap().to_string(), "100.96.250.0/23");
        assert_eq!(resolved.subnets.len(), 1);
        assert_eq!(resolved.subnets[0].origin, Origin::Provided);
        assert_eq!(resolved.allocations(), 0);
    }

    #[test]
    fn test_provided_vpc_with_malformed_value() {
        let yaml = r#"
vpcs:
  - account: perimeter
    name: Perimeter
    region: ca-central-1
    cidr:
      - value: 10.7.4.0/222
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            resolve_provided_vpc(&config.vpcs[0]),
            Err(CidrError::InvalidCidr { .. })
        ));
    }
}

//! Subnet range resolution inside a resolved VPC range.

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{parse_ranges, requested_prefix, Origin, ResolvedRange, ResolvedSubnet};
use crate::cidr::{self, AllocationError};
use crate::config::VpcConfig;
use crate::error::{CidrError, Result};
use crate::store::{account_owner_key, AssignmentStatus, AssignmentStore, SubnetAssignment, SubnetKey, REQUESTER};

/// Resolve one range per subnet definition of `vpc`, in configuration order.
///
/// Each definition is carved out of the VPC range for its pool tag. The used
/// set covers every subnet range stored for VPCs of this name in this
/// region and grows as the pass allocates.
pub fn resolve_subnet_ranges(
    store: &mut dyn AssignmentStore,
    vpc: &VpcConfig,
    vpc_ranges: &BTreeMap<String, ResolvedRange>,
) -> Result<Vec<ResolvedSubnet>> {
    let owner_key = account_owner_key(&vpc.account);
    let mut used = parse_ranges(store.used_subnet_cidrs(&vpc.name, &vpc.region)?)?;
    let mut resolved = Vec::new();

    for subnet in &vpc.subnets {
        for def in &subnet.definitions {
            let label = || format!("{}/{}/{}", vpc.label(), subnet.name, def.az);
            let pool = &def.cidr.pool;

            let bounding = vpc_ranges
                .get(pool)
                .map(|r| r.cidr)
                .ok_or_else(|| CidrError::UnresolvedVpcPool {
                    region: vpc.region.clone(),
                    vpc: vpc.name.clone(),
                    pool: pool.clone(),
                    subnet: format!("{}/{}", subnet.name, def.az),
                })?;

            let key = SubnetKey {
                region: &vpc.region,
                vpc_name: &vpc.name,
                subnet_name: &subnet.name,
                az: &def.az,
                account_key: &vpc.account,
            };

            if let Some(existing) = store.find_subnet_assignment(key)? {
                let cidr = cidr::parse(&existing.cidr)?;
                if !bounding.contains(&cidr) {
                    warn!("Stored range {} for subnet {} lies outside VPC range {}", cidr, label(), bounding);
                }
                debug!("Reusing {} for subnet {}", cidr, label());
                resolved.push(ResolvedSubnet {
                    name: subnet.name.clone(),
                    az: def.az.clone(),
                    pool: pool.clone(),
                    cidr,
                    origin: Origin::Reused,
                });
                continue;
            }

            let prefix_len = requested_prefix(def.cidr.size, || format!("Subnet \"{}\"", label()))?;
            let cidr = cidr::allocate(&bounding, prefix_len, &used).map_err(|e| match e {
                AllocationError::Exhausted { bounding, .. } => CidrError::PoolExhausted {
                    pool: pool.clone(),
                    region: vpc.region.clone(),
                    owner: format!("subnet \"{}\" ({})", label(), owner_key),
                    bounding,
                },
                AllocationError::InvalidPrefix { bounding, prefix_len } => {
                    CidrError::InvalidPrefix { prefix_len, bounding }
                }
            })?;

            store.put_subnet_assignment(SubnetAssignment {
                id: Uuid::new_v4(),
                region: vpc.region.clone(),
                vpc_name: vpc.name.clone(),
                subnet_name: subnet.name.clone(),
                az: def.az.clone(),
                pool: pool.clone(),
                cidr: cidr.to_string(),
                owner_key: owner_key.clone(),
                account_key: Some(vpc.account.clone()),
                requester: REQUESTER.to_string(),
                status: AssignmentStatus::Assigned,
                assigned_at: Some(Utc::now()),
            })?;
            used.push(cidr);

            info!("Assigned {} to subnet {} out of VPC range {}", cidr, label(), bounding);
            resolved.push(ResolvedSubnet {
                name: subnet.name.clone(),
                az: def.az.clone(),
                pool: pool.clone(),
                cidr,
                origin: Origin::Allocated,
            });
        }
    }

    Ok(resolved)
}

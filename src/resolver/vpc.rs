//! VPC range resolution for `cidr-src: dynamic`.

use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{parse_ranges, requested_prefix, Origin, ResolvedRange};
use crate::catalog::PoolCatalog;
use crate::cidr::{self, AllocationError};
use crate::config::VpcConfig;
use crate::error::{CidrError, Result};
use crate::store::{account_owner_key, AssignmentStatus, AssignmentStore, VpcAssignment, VpcKey, REQUESTER};

/// Resolve one range per requested pool of `vpc`, in request order.
///
/// A request whose `(region, vpc, pool, account)` identity is already stored
/// gets the stored range back without touching the allocator. Otherwise the
/// range is carved out of the pool's base range, avoiding every range already
/// assigned from that pool in that region, and persisted immediately.
pub fn resolve_vpc_ranges(
    store: &mut dyn AssignmentStore,
    catalog: &PoolCatalog,
    vpc: &VpcConfig,
) -> Result<BTreeMap<String, ResolvedRange>> {
    let owner_key = account_owner_key(&vpc.account);
    let mut resolved = BTreeMap::new();

    for request in &vpc.cidr {
        let prefix_len = requested_prefix(request.size, || {
            format!("VPC \"{}\" pool \"{}\"", vpc.label(), request.pool)
        })?;

        let key = VpcKey {
            region: &vpc.region,
            vpc_name: &vpc.name,
            pool: &request.pool,
            account_key: &vpc.account,
        };

        if let Some(existing) = store.find_vpc_assignment(key)? {
            let cidr = cidr::parse(&existing.cidr)?;
            if cidr.prefix_len() != prefix_len {
                warn!(
                    "VPC {} keeps {} from pool {} although /{} is now requested",
                    vpc.label(),
                    cidr,
                    request.pool,
                    prefix_len
                );
            }
            debug!("Reusing {} for VPC {} from pool {}", cidr, vpc.label(), request.pool);
            resolved.insert(
                request.pool.clone(),
                ResolvedRange {
                    cidr,
                    origin: Origin::Reused,
                },
            );
            continue;
        }

        let base = catalog.base_cidr(&request.pool, &vpc.region)?;
        let used = parse_ranges(store.used_vpc_cidrs(&request.pool, &vpc.region)?)?;

        let cidr = cidr::allocate(&base, prefix_len, &used).map_err(|e| match e {
            AllocationError::Exhausted { bounding, .. } => CidrError::PoolExhausted {
                pool: request.pool.clone(),
                region: vpc.region.clone(),
                owner: format!("VPC \"{}\" ({})", vpc.label(), owner_key),
                bounding,
            },
            AllocationError::InvalidPrefix { bounding, prefix_len } => {
                CidrError::InvalidPrefix { prefix_len, bounding }
            }
        })?;

        store.put_vpc_assignment(VpcAssignment {
            id: Uuid::new_v4(),
            pool: request.pool.clone(),
            region: vpc.region.clone(),
            vpc_name: vpc.name.clone(),
            owner_key: owner_key.clone(),
            account_key: Some(vpc.account.clone()),
            cidr: cidr.to_string(),
            requester: REQUESTER.to_string(),
            status: AssignmentStatus::Assigned,
            vpc_assigned_id: None,
            assigned_at: Some(Utc::now()),
        })?;

        info!(
            "Assigned {} to VPC {} ({}) from pool {} ({})",
            cidr,
            vpc.label(),
            owner_key,
            request.pool,
            base
        );
        resolved.insert(
            request.pool.clone(),
            ResolvedRange {
                cidr,
                origin: Origin::Allocated,
            },
        );
    }

    Ok(resolved)
}

//! Resolution for `cidr-src: lookup` VPCs.
//!
//! A lookup VPC never allocates. Its ranges were assigned earlier, either to
//! the account itself or to the organizational unit the VPC is declared
//! under. Records found only at the organizational-unit level are copied to
//! an account-level record so later runs find them directly.

use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use super::{Origin, ResolvedRange, ResolvedSubnet, ResolvedVpc};
use crate::cidr;
use crate::config::VpcConfig;
use crate::error::{CidrError, Result};
use crate::store::{account_owner_key, ou_owner_key, AssignmentStore, SubnetAssignment, VpcAssignment};

pub fn resolve_lookup_vpc(store: &mut dyn AssignmentStore, vpc: &VpcConfig) -> Result<ResolvedVpc> {
    let mut resolved = ResolvedVpc::empty(vpc);
    let ou_key = vpc.ou.as_deref().map(ou_owner_key);

    let matches_vpc = |a: &VpcAssignment| a.region == vpc.region && a.vpc_name == vpc.name;
    let all_vpcs = store.vpc_assignments()?;

    let mut records: Vec<VpcAssignment> = all_vpcs
        .iter()
        .filter(|a| matches_vpc(*a) && a.is_owned_by_account(&vpc.account))
        .cloned()
        .collect();
    if records.is_empty() {
        if let Some(ou_key) = &ou_key {
            records = all_vpcs
                .iter()
                .filter(|a| matches_vpc(*a) && &a.owner_key == ou_key)
                .cloned()
                .collect();
        }
    }
    if records.is_empty() {
        return Err(CidrError::LookupNotFound {
            what: format!("VPC \"{}\"", vpc.label()),
        });
    }

    for record in records {
        let cidr = cidr::parse(&record.cidr)?;
        if ou_key.as_deref() == Some(record.owner_key.as_str()) {
            info!(
                "Copying {} for VPC {} from {} to account {}",
                cidr,
                vpc.label(),
                record.owner_key,
                vpc.account
            );
            store.put_vpc_assignment(VpcAssignment {
                id: Uuid::new_v4(),
                owner_key: account_owner_key(&vpc.account),
                account_key: Some(vpc.account.clone()),
                assigned_at: Some(Utc::now()),
                ..record.clone()
            })?;
        }
        resolved.pools.entry(record.pool.clone()).or_insert(ResolvedRange {
            cidr,
            origin: Origin::LookedUp,
        });
    }

    let all_subnets = store.subnet_assignments()?;
    for subnet in &vpc.subnets {
        for def in &subnet.definitions {
            let matches_subnet = |a: &&SubnetAssignment| {
                a.region == vpc.region && a.vpc_name == vpc.name && a.subnet_name == subnet.name && a.az == def.az
            };

            let record = all_subnets
                .iter()
                .filter(matches_subnet)
                .find(|a| a.is_owned_by_account(&vpc.account))
                .or_else(|| {
                    let ou_key = ou_key.as_deref()?;
                    all_subnets.iter().filter(matches_subnet).find(|a| a.owner_key == ou_key)
                })
                .ok_or_else(|| CidrError::LookupNotFound {
                    what: format!("Subnet \"{}/{}/{}\"", vpc.label(), subnet.name, def.az),
                })?;

            let cidr = cidr::parse(&record.cidr)?;
            if ou_key.as_deref() == Some(record.owner_key.as_str()) {
                debug!(
                    "Copying {} for subnet {}/{}/{} to account {}",
                    cidr,
                    vpc.label(),
                    subnet.name,
                    def.az,
                    vpc.account
                );
                store.put_subnet_assignment(SubnetAssignment {
                    id: Uuid::new_v4(),
                    owner_key: account_owner_key(&vpc.account),
                    account_key: Some(vpc.account.clone()),
                    assigned_at: Some(Utc::now()),
                    ..record.clone()
                })?;
            }

            resolved.subnets.push(ResolvedSubnet {
                name: subnet.name.clone(),
                az: def.az.clone(),
                pool: record.pool.clone(),
                cidr,
                origin: Origin::LookedUp,
            });
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{AssignmentStatus, MemoryStore, REQUESTER};

    const LOOKUP: &str = r#"
vpcs:
  - account: dev
    ou: workloads
    name: Dev
    region: ca-central-1
    cidr-src: lookup
    subnets:
      - name: App
        definitions:
          - az: a
            cidr: { pool: main }
"#;

    fn vpc_config() -> VpcConfig {
        let config: Config = serde_yaml::from_str(LOOKUP).unwrap();
        config.vpcs.into_iter().next().unwrap()
    }

    fn vpc_record(owner_key: &str, cidr: &str) -> VpcAssignment {
        VpcAssignment {
            id: Uuid::new_v4(),
            pool: "main".to_string(),
            region: "ca-central-1".to_string(),
            vpc_name: "Dev".to_string(),
            owner_key: owner_key.to_string(),
            account_key: None,
            cidr: cidr.to_string(),
            requester: REQUESTER.to_string(),
            status: AssignmentStatus::Assigned,
            vpc_assigned_id: Some(7),
            assigned_at: None,
        }
    }

    fn subnet_record(owner_key: &str, cidr: &str) -> SubnetAssignment {
        SubnetAssignment {
            id: Uuid::new_v4(),
            region: "ca-central-1".to_string(),
            vpc_name: "Dev".to_string(),
            subnet_name: "App".to_string(),
            az: "a".to_string(),
            pool: "main".to_string(),
            cidr: cidr.to_string(),
            owner_key: owner_key.to_string(),
            account_key: None,
            requester: REQUESTER.to_string(),
            status: AssignmentStatus::Assigned,
            assigned_at: None,
        }
    }

    #[test]
    fn test_account_records_are_used_as_is() {
        let mut store = MemoryStore::new();
        store.put_vpc_assignment(vpc_record("account/dev", "10.2.0.0/16")).unwrap();
        store.put_subnet_assignment(subnet_record("account/dev", "10.2.0.0/24")).unwrap();
        let writes = store.writes();

        let resolved = resolve_lookup_vpc(&mut store, &vpc_config()).unwrap();
        assert_eq!(resolved.cidr("main").unwrap().to_string(), "10.2.0.0/16");
        assert_eq!(resolved.subnet_cidr("App", "a").unwrap().to_string(), "10.2.0.0/24");
        assert_eq!(store.writes(), writes);
    }

    #[test]
    fn test_ou_records_are_copied_to_account() {
        let mut store = MemoryStore::new();
        store
            .put_vpc_assignment(vpc_record("organizational-unit/workloads", "10.3.0.0/16"))
            .unwrap();
        store
            .put_subnet_assignment(subnet_record("organizational-unit/workloads", "10.3.1.0/24"))
            .unwrap();

        let resolved = resolve_lookup_vpc(&mut store, &vpc_config()).unwrap();
        assert_eq!(resolved.cidr("main").unwrap().to_string(), "10.3.0.0/16");
        assert_eq!(resolved.pools["main"].origin, Origin::LookedUp);

        let copied: Vec<_> = store
            .vpc_assignments()
            .unwrap()
            .into_iter()
            .filter(|a| a.owner_key == "account/dev")
            .collect();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].cidr, "10.3.0.0/16");
        assert_eq!(copied[0].vpc_assigned_id, Some(7));

        let copied_subnets = store
            .subnet_assignments()
            .unwrap()
            .into_iter()
            .filter(|a| a.is_owned_by_account("dev"))
            .count();
        assert_eq!(copied_subnets, 1);

        // Second run finds the account-level copies and writes nothing
        let writes = store.writes();
        resolve_lookup_vpc(&mut store, &vpc_config()).unwrap();
        assert_eq!(store.writes(), writes);
    }

    #[test]
    fn test_nothing_stored_is_fatal() {
        let mut store = MemoryStore::new();
        let err = resolve_lookup_vpc(&mut store, &vpc_config()).unwrap_err();
        assert!(matches!(err, CidrError::LookupNotFound { .. }));
        assert!(err.to_string().contains("ca-central-1/Dev"));
    }

    #[test]
    fn test_missing_subnet_is_fatal() {
        let mut store = MemoryStore::new();
        store.put_vpc_assignment(vpc_record("account/dev", "10.2.0.0/16")).unwrap();

        let err = resolve_lookup_vpc(&mut store, &vpc_config()).unwrap_err();
        assert!(err.to_string().contains("ca-central-1/Dev/App/a"));
    }
}

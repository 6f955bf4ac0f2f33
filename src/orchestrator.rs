//! Resolution pass orchestrator.
//!
//! Runs one complete pass over the configuration: materialize the pool
//! catalog, then resolve every VPC (and its subnets) strictly in
//! configuration order. The order decides who gets which range when several
//! VPCs draw from the same pool, so it must not change between runs.
//!
//! The pass stops at the first error. Assignments persisted before the error
//! stay, and a rerun picks them up again.

use color_eyre::eyre::WrapErr;
use log::info;
use serde::Serialize;
use std::path::Path;

use crate::catalog::PoolCatalog;
use crate::config::{CidrSource, Config};
use crate::error::Result;
use crate::resolver::{resolve_vpc, ResolvedVpc};
use crate::store::AssignmentStore;

/// Output of one pass, consumed by template generation downstream
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub vpcs: Vec<ResolvedVpc>,
    /// Ranges newly allocated by this pass
    pub allocations: usize,
}

impl ResolutionReport {
    pub fn vpc(&self, account: &str, region: &str, name: &str) -> Option<&ResolvedVpc> {
        self.vpcs
            .iter()
            .find(|v| v.account == account && v.region == region && v.name == name)
    }
}

/// Resolve every VPC of `config` against `store`
pub fn run_pass(store: &mut dyn AssignmentStore, config: &Config) -> Result<ResolutionReport> {
    let catalog = PoolCatalog::materialize(store, &config.cidr_pools)?;
    info!(
        "Pool catalog holds {} pools, {} of {} VPCs draw from it",
        catalog.pools().len(),
        config.vpcs_with_source(CidrSource::Dynamic).count(),
        config.vpcs.len()
    );

    let mut vpcs = Vec::with_capacity(config.vpcs.len());
    for vpc in &config.vpcs {
        info!("Resolving VPC {} for account {} (cidr-src {:?})", vpc.label(), vpc.account, vpc.cidr_src);
        vpcs.push(resolve_vpc(store, &catalog, vpc)?);
    }

    let allocations: usize = vpcs.iter().map(ResolvedVpc::allocations).sum();
    info!("Resolved {} VPCs, {} new ranges allocated", vpcs.len(), allocations);

    Ok(ResolutionReport { vpcs, allocations })
}

/// Write the report as pretty JSON
pub fn write_report(report: &ResolutionReport, output_path: &Path) -> color_eyre::Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create output directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(output_path, json)
        .wrap_err_with(|| format!("Failed to write report '{}'", output_path.display()))?;
    info!("Wrote resolved ranges to {:?}", output_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CidrError;
    use crate::resolver::Origin;
    use crate::store::MemoryStore;
    use tempfile::tempdir;

    const TWO_VPCS: &str = r#"
cidr-pools:
  - pool: main
    region: us-east-1
    cidr: 10.0.0.0/16
vpcs:
  - account: dev
    name: Dev
    region: us-east-1
    cidr-src: dynamic
    cidr:
      - size: 20
    subnets:
      - name: App
        definitions:
          - az: a
            cidr: { size: 24 }
          - az: b
            cidr: { size: 24 }
  - account: perimeter
    name: Perimeter
    region: us-east-1
    cidr:
      - value: 172.16.0.0/20
  - account: test
    name: Test
    region: us-east-1
    cidr-src: dynamic
    cidr:
      - size: 20
"#;

    #[test]
    fn test_pass_resolves_in_order() {
        let config: Config = serde_yaml::from_str(TWO_VPCS).unwrap();
        let mut store = MemoryStore::new();

        let report = run_pass(&mut store, &config).unwrap();
        assert_eq!(report.vpcs.len(), 3);
        assert_eq!(report.allocations, 4);

        let dev = report.vpc("dev", "us-east-1", "Dev").unwrap();
        assert_eq!(dev.cidr("main").unwrap().to_string(), "10.0.0.0/20");
        assert_eq!(dev.subnet_cidr("App", "b").unwrap().to_string(), "10.0.1.0/24");

        let perimeter = report.vpc("perimeter", "us-east-1", "Perimeter").unwrap();
        assert_eq!(perimeter.pools["main"].origin, Origin::Provided);

        let test = report.vpc("test", "us-east-1", "Test").unwrap();
        assert_eq!(test.cidr("main").unwrap().to_string(), "10.0.16.0/20");
    }

    #[test]
    fn test_second_pass_allocates_nothing() {
        let config: Config = serde_yaml::from_str(TWO_VPCS).unwrap();
        let mut store = MemoryStore::new();

        let first = run_pass(&mut store, &config).unwrap();
        let writes = store.writes();
        let second = run_pass(&mut store, &config).unwrap();

        assert_eq!(second.allocations, 0);
        assert_eq!(store.writes(), writes);
        for (a, b) in first.vpcs.iter().zip(&second.vpcs) {
            assert_eq!(a.cidr("main"), b.cidr("main"));
        }
    }

    #[test]
    fn test_pass_stops_at_first_error() {
        let yaml = r#"
cidr-pools:
  - { pool: main, region: us-east-1, cidr: 10.0.0.0/16 }
vpcs:
  - account: dev
    name: Dev
    region: eu-west-1
    cidr-src: dynamic
    cidr:
      - size: 20
  - account: test
    name: Test
    region: us-east-1
    cidr-src: dynamic
    cidr:
      - size: 20
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let mut store = MemoryStore::new();

        assert!(matches!(run_pass(&mut store, &config), Err(CidrError::PoolNotFound { .. })));
        assert!(store.vpc_assignments().unwrap().is_empty());
    }

    #[test]
    fn test_write_report() {
        let config: Config = serde_yaml::from_str(TWO_VPCS).unwrap();
        let mut store = MemoryStore::new();
        let report = run_pass(&mut store, &config).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("resolved-cidrs.json");
        write_report(&report, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["allocations"], 4);
        assert_eq!(value["vpcs"][0]["pools"]["main"]["cidr"], "10.0.0.0/20");
        assert_eq!(value["vpcs"][0]["cidr-src"], "dynamic");
        assert_eq!(value["vpcs"][0]["subnets"][0]["origin"], "allocated");
    }
}

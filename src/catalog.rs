//! Pool catalog.
//!
//! The set of named base ranges is written to the store the first time the
//! engine runs and read back from there on every later run. Editing
//! `cidr-pools` in the configuration afterwards has no effect, so ranges
//! already handed out can never end up outside their pool.

use ipnet::Ipv4Net;
use log::{info, warn};

use crate::cidr;
use crate::config::CidrPoolConfig;
use crate::error::{CidrError, Result};
use crate::store::{AssignmentStore, PoolRecord};

/// A named, region-scoped base range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
    pub region: String,
    pub base: Ipv4Net,
}

#[derive(Debug, Clone, Default)]
pub struct PoolCatalog {
    pools: Vec<Pool>,
}

impl PoolCatalog {
    /// Load the stored catalog, seeding it from `configured` if the store has none.
    pub fn materialize(store: &mut dyn AssignmentStore, configured: &[CidrPoolConfig]) -> Result<Self> {
        let mut records = store.pools()?;

        if records.is_empty() && !configured.is_empty() {
            info!("Seeding cidr pool catalog with {} pools from configuration", configured.len());
            for (index, pool) in configured.iter().enumerate() {
                store.put_pool(PoolRecord {
                    id: (index + 1).to_string(),
                    pool: pool.pool.clone(),
                    region: pool.region.clone(),
                    cidr: pool.cidr.clone(),
                })?;
            }
            records = store.pools()?;
        }

        let pools = records
            .into_iter()
            .map(|r| -> Result<Pool> {
                Ok(Pool {
                    base: cidr::parse(&r.cidr)?,
                    name: r.pool,
                    region: r.region,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let catalog = Self { pools };
        catalog.warn_on_drift(configured);
        Ok(catalog)
    }

    fn warn_on_drift(&self, configured: &[CidrPoolConfig]) {
        for wanted in configured {
            match self.get(&wanted.pool, &wanted.region) {
                None => warn!(
                    "Pool '{}' in {} is configured but not in the stored catalog; it will not be used",
                    wanted.pool, wanted.region
                ),
                Some(stored) if stored.base.to_string() != wanted.cidr.trim() => warn!(
                    "Pool '{}' in {} is configured as {} but the stored catalog has {}; keeping {}",
                    wanted.pool, wanted.region, wanted.cidr, stored.base, stored.base
                ),
                Some(_) => {}
            }
        }
    }

    pub fn get(&self, name: &str, region: &str) -> Option<&Pool> {
        self.pools.iter().find(|p| p.name == name && p.region == region)
    }

    /// Base range of `(name, region)`, or `PoolNotFound`
    pub fn base_cidr(&self, name: &str, region: &str) -> Result<Ipv4Net> {
        self.get(name, region)
            .map(|p| p.base)
            .ok_or_else(|| CidrError::PoolNotFound {
                pool: name.to_string(),
                region: region.to_string(),
            })
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }
}

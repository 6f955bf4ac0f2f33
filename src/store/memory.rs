//! In-process assignment store.

use super::{AssignmentStore, PoolRecord, StoreResult, SubnetAssignment, VpcAssignment};

/// Keeps every table in memory. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pools: Vec<PoolRecord>,
    vpcs: Vec<VpcAssignment>,
    subnets: Vec<SubnetAssignment>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records written since creation
    pub fn writes(&self) -> usize {
        self.writes
    }
}

fn upsert<T>(rows: &mut Vec<T>, row: T, same: impl Fn(&T) -> bool) {
    match rows.iter().position(same) {
        Some(index) => rows[index] = row,
        None => rows.push(row),
    }
}

impl AssignmentStore for MemoryStore {
    fn pools(&self) -> StoreResult<Vec<PoolRecord>> {
        Ok(self.pools.clone())
    }

    fn put_pool(&mut self, pool: PoolRecord) -> StoreResult<()> {
        let id = pool.id.clone();
        upsert(&mut self.pools, pool, |p| p.id == id);
        self.writes += 1;
        Ok(())
    }

    fn vpc_assignments(&self) -> StoreResult<Vec<VpcAssignment>> {
        Ok(self.vpcs.clone())
    }

    fn put_vpc_assignment(&mut self, assignment: VpcAssignment) -> StoreResult<()> {
        let id = assignment.id;
        upsert(&mut self.vpcs, assignment, |a| a.id == id);
        self.writes += 1;
        Ok(())
    }

    fn subnet_assignments(&self) -> StoreResult<Vec<SubnetAssignment>> {
        Ok(self.subnets.clone())
    }

    fn put_subnet_assignment(&mut self, assignment: SubnetAssignment) -> StoreResult<()> {
        let id = assignment.id;
        upsert(&mut self.subnets, assignment, |a| a.id == id);
        self.writes += 1;
        Ok(())
    }
}

//! JSON file backed assignment store.
//!
//! Layout of a state directory:
//!
//! ```text
//! <state-dir>/
//! |-- .lock                          # held while a run has the store open
//! |-- cidr-pools.json
//! |-- vpc-cidr-assignments.json
//! \-- subnet-cidr-assignments.json
//! ```
//!
//! Each table is a JSON array rewritten in full on every put, through a
//! temporary file and a rename so a crash never leaves a half-written table.

use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::retry::{with_retry, RetryPolicy};
use super::{AssignmentStore, PoolRecord, StoreError, StoreResult, SubnetAssignment, VpcAssignment};

const POOLS_FILE: &str = "cidr-pools.json";
const VPC_FILE: &str = "vpc-cidr-assignments.json";
const SUBNET_FILE: &str = "subnet-cidr-assignments.json";
const LOCK_FILE: &str = ".lock";

/// Exclusive claim on a state directory, released on drop
#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(StoreError::Locked { path }),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        // Best effort, the lock is the file's existence
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self { path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    policy: RetryPolicy,
    _lock: StoreLock,
}

impl JsonFileStore {
    /// Open (creating if needed) the state directory and take its lock.
    pub fn open(dir: impl AsRef<Path>, policy: RetryPolicy) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        with_retry(&policy, "creating the state directory", || fs::create_dir_all(&dir)).map_err(|source| {
            StoreError::Io {
                path: dir.clone(),
                source,
            }
        })?;
        let lock = StoreLock::acquire(&dir)?;
        debug!("Opened state directory {}", dir.display());
        Ok(Self {
            dir,
            policy,
            _lock: lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_table<T: DeserializeOwned>(&self, file: &str) -> StoreResult<Vec<T>> {
        let path = self.dir.join(file);
        let content = with_retry(&self.policy, "reading a state table", || match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        })
        .map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })
    }

    fn write_table<T: Serialize>(&self, file: &str, rows: &[T]) -> StoreResult<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(rows).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        let tmp_path = self.dir.join(format!("{}.tmp", file));

        with_retry(&self.policy, "writing a state table", || {
            fs::write(&tmp_path, &json)?;
            fs::rename(&tmp_path, &path)
        })
        .map_err(|source| StoreError::Io { path, source })
    }

    fn upsert<T>(&self, file: &str, row: T, same: impl Fn(&T) -> bool) -> StoreResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut rows: Vec<T> = self.read_table(file)?;
        match rows.iter().position(same) {
            Some(index) => rows[index] = row,
            None => rows.push(row),
        }
        self.write_table(file, &rows)
    }
}

impl AssignmentStore for JsonFileStore {
    fn pools(&self) -> StoreResult<Vec<PoolRecord>> {
        self.read_table(POOLS_FILE)
    }

    fn put_pool(&mut self, pool: PoolRecord) -> StoreResult<()> {
        let id = pool.id.clone();
        self.upsert(POOLS_FILE, pool, |p: &PoolRecord| p.id == id)
    }

    fn vpc_assignments(&self) -> StoreResult<Vec<VpcAssignment>> {
        self.read_table(VPC_FILE)
    }

    fn put_vpc_assignment(&mut self, assignment: VpcAssignment) -> StoreResult<()> {
        let id = assignment.id;
        self.upsert(VPC_FILE, assignment, |a: &VpcAssignment| a.id == id)
    }

    fn subnet_assignments(&self) -> StoreResult<Vec<SubnetAssignment>> {
        self.read_table(SUBNET_FILE)
    }

    fn put_subnet_assignment(&mut self, assignment: SubnetAssignment) -> StoreResult<()> {
        let id = assignment.id;
        self.upsert(SUBNET_FILE, assignment, |a: &SubnetAssignment| a.id == id)
    }
}

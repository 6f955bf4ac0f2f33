//! # cidrpool - Dynamic CIDR allocation for multi-account VPC provisioning
//!
//! Hands out non-overlapping IPv4 ranges to VPCs from a few shared, named
//! pools, and to subnets from within each VPC's range. Every range ever
//! handed out is recorded, and a request with an identity that was seen
//! before always gets the same range back, so the resolution step can be
//! retried as often as the surrounding pipeline needs.
//!
//! ## Architecture
//!
//! - `cidr`: range arithmetic and the pure first-fit allocator
//! - `catalog`: the pool catalog, seeded once from configuration
//! - `store`: durable pool and assignment tables (memory or JSON files)
//! - `resolver`: per-VPC and per-subnet reuse-before-allocate resolution
//! - `orchestrator`: one complete pass over the configuration
//! - `config` / `config_loader`: YAML configuration and validation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cidrpool::{config_loader, orchestrator};
//! use cidrpool::store::JsonFileStore;
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("cidrpool.yaml"))?;
//! let mut store = JsonFileStore::open("cidr_state", config.store)?;
//!
//! let report = orchestrator::run_pass(&mut store, &config)?;
//! orchestrator::write_report(&report, Path::new("resolved-cidrs.json"))?;
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Allocation Order
//!
//! VPCs are resolved one at a time in configuration order, and all subnets
//! of a VPC before the next VPC. Within a pool, candidates are tried in
//! address order and a conflict moves the candidate forward by its own
//! block size. Two runs over the same configuration and state therefore
//! always produce the same ranges.
//!
//! ## Error Handling
//!
//! Library operations return [`error::CidrError`]; the binary reports
//! errors through `color_eyre`. Nothing is ever released: an assignment
//! written before a failure stays and is reused on the next run.

pub mod catalog;
pub mod cidr;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod store;

pub use error::{CidrError, Result};

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;

use cidrpool::config_loader;
use cidrpool::orchestrator::{run_pass, write_report};
use cidrpool::store::{AssignmentStore, JsonFileStore, MemoryStore};

/// Assign non-overlapping CIDR ranges to VPCs and subnets from shared pools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Directory holding the pool catalog and assignment tables
    #[arg(short, long, default_value = "cidr_state")]
    state_dir: PathBuf,

    /// Where to write the resolved ranges (JSON)
    #[arg(short, long, default_value = "resolved-cidrs.json")]
    output: PathBuf,

    /// Resolve against a copy of the state in memory; nothing is persisted
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Configuration file: {:?}", args.config);
    info!("State directory: {:?}", args.state_dir);

    let config = config_loader::load_config(&args.config)?;

    let report = if args.dry_run {
        warn!("Dry run: assignments will not be persisted");
        let mut store = snapshot(&args, &config.store)?;
        run_pass(&mut store, &config)?
    } else {
        let mut store = JsonFileStore::open(&args.state_dir, config.store)
            .wrap_err_with(|| format!("Failed to open state directory '{}'", args.state_dir.display()))?;
        run_pass(&mut store, &config)?
    };

    write_report(&report, &args.output)?;
    info!("Resolution completed: {} new ranges", report.allocations);
    Ok(())
}

/// Copy whatever is already stored into a memory store
fn snapshot(args: &Args, policy: &cidrpool::store::RetryPolicy) -> Result<MemoryStore> {
    let mut memory = MemoryStore::new();
    if !args.state_dir.exists() {
        return Ok(memory);
    }

    let disk = JsonFileStore::open(&args.state_dir, *policy)
        .wrap_err_with(|| format!("Failed to open state directory '{}'", args.state_dir.display()))?;
    for pool in disk.pools()? {
        memory.put_pool(pool)?;
    }
    for assignment in disk.vpc_assignments()? {
        memory.put_vpc_assignment(assignment)?;
    }
    for assignment in disk.subnet_assignments()? {
        memory.put_subnet_assignment(assignment)?;
    }
    Ok(memory)
}

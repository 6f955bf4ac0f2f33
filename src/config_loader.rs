use crate::config::Config;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::Path;

/// Load, parse and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file '{}'", config_path.display()))?;

    info!(
        "Configuration declares {} cidr pools and {} VPCs",
        config.cidr_pools.len(),
        config.vpcs.len()
    );

    config.validate()?;

    if config.cidr_pools.is_empty() && !config.vpcs.is_empty() {
        warn!("No cidr-pools declared; dynamic VPCs can only resolve against pools already in the state directory");
    }

    Ok(config)
}

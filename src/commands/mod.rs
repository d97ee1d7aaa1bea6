//! CLI command implementations.
//!
//! Each subcommand exposes a `run` entry point that loads the configuration
//! and builds real clients, plus flow functions taking the
//! [`InventoryApi`](crate::api::InventoryApi) and
//! [`CloudProvider`](crate::cloud::CloudProvider) seams so they can be
//! tested against mocks.

pub mod add_by_geo;
pub mod delete;
pub mod init;
pub mod report;
pub mod sync;

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use crate::api::BitDiscoveryClient;
use crate::config::{Config, Environment, SecureString};

/// Load the config file, or defaults when it does not exist
pub(crate) fn load_config(config_path: &Path) -> Result<Config> {
    let config = Config::load_or_default(config_path)?;
    debug!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

/// API client for the selected environment (`--env` wins over the config)
pub(crate) fn connect(
    config: &Config,
    env: Option<Environment>,
    api_key: SecureString,
) -> Result<BitDiscoveryClient> {
    let env = env.unwrap_or(config.environment);
    let url = config.api_url(env)?;
    debug!("Using {:?} environment at {}", env, url);
    BitDiscoveryClient::new(url, api_key)
}

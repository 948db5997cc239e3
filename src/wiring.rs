use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use runwatch_adapter_sqlite::{PollingChangeFeed, SqliteRunStore};
use runwatch_application::Supervisor;
use runwatch_domain::RunwatchConfig;
use runwatch_ports::PortSet;

use crate::cli::Cli;

/// Loads the config file if present, then applies CLI overrides.
pub fn load_config(cli: &Cli) -> Result<RunwatchConfig> {
    let path = cli.config_path();
    let mut config = if path.exists() {
        RunwatchConfig::load_from_path(&path)?
    } else {
        info!(path = %path.display(), "no config file, using defaults");
        RunwatchConfig::default()
    };
    if let Some(db) = &cli.db {
        config.store.sqlite_path = db.clone();
    }
    Ok(config)
}

pub fn sqlite_ports(config: &RunwatchConfig) -> Result<PortSet> {
    let store = SqliteRunStore::open(Path::new(&config.store.sqlite_path), config.store.pool_size)?;
    let feed = PollingChangeFeed::new(store.pool(), config.watch.poll_interval());
    Ok(PortSet::new(Arc::new(store), Arc::new(feed)))
}

pub fn supervisor(config: &RunwatchConfig) -> Result<Supervisor> {
    let ports = sqlite_ports(config)?;
    Ok(Supervisor::new(ports, config.clone()))
}

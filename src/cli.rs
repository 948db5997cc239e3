use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "runwatch-service", about = "Watch manager runs and summarize them")]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, env = "RUNWATCH_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// SQLite database, overriding `store.sqlite_path`.
    #[arg(long, env = "RUNWATCH_DB")]
    pub db: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Run a single discovery pass, finish whatever was found, and exit.
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }

        if let Ok(home) = env::var("HOME") {
            return Path::new(&home).join(".runwatch").join("config.yaml");
        }

        PathBuf::from("runwatch-config.yaml")
    }
}

//! strata CLI library

pub mod commands;
pub mod error;
pub mod inventory;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use strata_common::{LogFormat, StrataConfig};

/// strata - cluster lifecycle management
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short = 'c', long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the tasks a teardown would run, without running them
    Plan(commands::plan::PlanArgs),
}

impl Cli {
    /// Load configuration: file, then environment, then command-line flags
    pub fn load_config(&self) -> Result<StrataConfig> {
        let mut config = StrataConfig::load(self.config.as_deref())?;
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        Ok(config)
    }

    /// Run the CLI command
    pub async fn run(self, config: StrataConfig) -> Result<()> {
        match self.command {
            Commands::Plan(args) => commands::plan::run(args, config.wait).await,
        }
    }
}

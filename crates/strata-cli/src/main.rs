//! strata CLI
//!
//! Plans cluster teardown from an inventory snapshot.

use clap::Parser;
use strata_common::telemetry;

use strata_cli::{Cli, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    telemetry::init_logging(&config.logging)?;

    cli.run(config).await
}

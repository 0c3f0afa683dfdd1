//! Corpscope CLI: company-profile collection and validation.
//!
//! Runs the Wikipedia → preparation → validation → storage pipeline for
//! one or more companies and inspects persisted runs.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

//! Tripcast - Main Entry Point

use clap::Parser;
use tripcast::cli::{execute, init_logging, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    execute(cli)
}

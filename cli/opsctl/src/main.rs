//! opsctl - operator CLI for containerops allocations
//!
//! Inspects and edits the IP and port allocation tables of a state
//! directory, using the same locking as the deployment tooling.

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run() {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

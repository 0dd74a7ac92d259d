//! CLI commands.

mod endpoint;
mod ip;
mod port;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use containerops_alloc::{AllocatorConfig, TableStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::CliError;
use crate::output::OutputFormat;

/// opsctl - inspect and edit containerops overlay allocations.
#[derive(Debug, Parser)]
#[command(name = "opsctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// State directory; allocation tables live under `<state-dir>/networks`.
    #[arg(long, global = true, env = "CONTAINEROPS_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Log lock and table activity to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage overlay IP allocations.
    Ip(ip::IpCommand),

    /// Manage underlay port allocations.
    Port(port::PortCommand),

    /// Allocate or release both resources of an endpoint.
    Endpoint(endpoint::EndpointCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub fn run(self) -> Result<()> {
        init_tracing(self.verbose);

        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        if let Commands::Version = self.command {
            println!("opsctl {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let state_dir = match self.state_dir {
            Some(dir) => dir,
            None => Config::load()?
                .state_dir
                .ok_or(CliError::MissingStateDir)?,
        };

        let allocator =
            AllocatorConfig::from_env().context("Invalid allocator configuration")?;
        debug!(
            state_dir = %state_dir.display(),
            lock_timeout_ms = allocator.lock_timeout.as_millis() as u64,
            command = ?self.command,
            "Resolved command context"
        );

        let ctx = CommandContext {
            format,
            state_dir,
            allocator,
        };

        match self.command {
            Commands::Ip(cmd) => cmd.run(ctx),
            Commands::Port(cmd) => cmd.run(ctx),
            Commands::Endpoint(cmd) => cmd.run(ctx),
            Commands::Version => Ok(()),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
    pub state_dir: PathBuf,
    pub allocator: AllocatorConfig,
}

impl CommandContext {
    /// Table store rooted at `<state-dir>/networks`.
    pub fn store(&self) -> TableStore {
        TableStore::new(self.state_dir.join("networks"), self.allocator)
    }
}

/// Parse a `LOW-HIGH` port range.
fn parse_port_range(s: &str) -> Result<(u16, u16), CliError> {
    let invalid = || CliError::InvalidPortRange(s.to_string());
    let (low, high) = s.split_once('-').ok_or_else(invalid)?;
    let low = low.trim().parse().map_err(|_| invalid())?;
    let high = high.trim().parse().map_err(|_| invalid())?;
    Ok((low, high))
}

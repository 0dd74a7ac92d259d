//! Underlay port commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use containerops_alloc::PortAllocator;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::{parse_port_range, CommandContext};

/// Port commands.
#[derive(Debug, Args)]
pub struct PortCommand {
    #[command(subcommand)]
    command: PortSubcommand,
}

#[derive(Debug, Subcommand)]
enum PortSubcommand {
    /// Allocate (or look up) the underlay port of a hostname on a machine.
    Allocate(AllocatePortArgs),

    /// Release the underlay port held by a hostname on a machine.
    Release(PortKeyArgs),

    /// List all port bindings on a machine.
    List(ListPortArgs),
}

#[derive(Debug, Args)]
struct AllocatePortArgs {
    #[command(flatten)]
    key: PortKeyArgs,

    /// Port range as LOW-HIGH, inclusive.
    #[arg(long, value_parser = parse_port_range, default_value = "12500-13000")]
    range: (u16, u16),
}

#[derive(Debug, Args)]
struct PortKeyArgs {
    /// Network name.
    network: String,

    /// Machine ID.
    machine: String,

    /// Hostname of the endpoint.
    hostname: String,
}

#[derive(Debug, Args)]
struct ListPortArgs {
    /// Network name.
    network: String,

    /// Machine ID.
    machine: String,
}

impl PortCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            PortSubcommand::Allocate(args) => allocate_port(ctx, args),
            PortSubcommand::Release(args) => release_port(ctx, args),
            PortSubcommand::List(args) => list_ports(ctx, args),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct PortRow {
    #[tabled(rename = "Hostname")]
    hostname: String,

    #[tabled(rename = "Port")]
    port: u16,

    #[tabled(rename = "Allocated")]
    allocated_at: String,
}

#[derive(Debug, Serialize)]
struct AllocatedPort<'a> {
    network: &'a str,
    machine: &'a str,
    hostname: &'a str,
    port: u16,
}

/// Result of a release; `port` is the port that was freed, if any.
#[derive(Debug, Serialize)]
pub(super) struct Released<'a> {
    pub network: &'a str,
    pub machine: &'a str,
    pub hostname: &'a str,
    pub port: Option<u16>,
}

fn allocate_port(ctx: CommandContext, args: AllocatePortArgs) -> Result<()> {
    let key = &args.key;
    let port = PortAllocator::new(ctx.store())
        .allocate(&key.network, &key.machine, &key.hostname, args.range, true)?
        .ok_or_else(|| anyhow::anyhow!("allocator returned no port for {}", key.hostname))?;

    match ctx.format {
        OutputFormat::Table => print_success(&format!(
            "{} on {}/{} has port {}",
            key.hostname, key.network, key.machine, port
        )),
        OutputFormat::Json => print_single(&AllocatedPort {
            network: &key.network,
            machine: &key.machine,
            hostname: &key.hostname,
            port,
        }),
    }
    Ok(())
}

fn release_port(ctx: CommandContext, args: PortKeyArgs) -> Result<()> {
    let released =
        PortAllocator::new(ctx.store()).release(&args.network, &args.machine, &args.hostname)?;

    match (ctx.format, released) {
        (OutputFormat::Json, port) => print_single(&Released {
            network: &args.network,
            machine: &args.machine,
            hostname: &args.hostname,
            port,
        }),
        (OutputFormat::Table, Some(port)) => {
            print_success(&format!("Released port {} from {}", port, args.hostname))
        }
        (OutputFormat::Table, None) => print_info(&format!(
            "{} held no port on {}/{}",
            args.hostname, args.network, args.machine
        )),
    }
    Ok(())
}

fn list_ports(ctx: CommandContext, args: ListPortArgs) -> Result<()> {
    let rows: Vec<PortRow> = PortAllocator::new(ctx.store())
        .list(&args.network, &args.machine)?
        .into_iter()
        .map(|(hostname, allocation)| PortRow {
            hostname,
            port: allocation.value,
            allocated_at: allocation.allocated_at.to_rfc3339(),
        })
        .collect();

    print_output(&rows, ctx.format);
    Ok(())
}

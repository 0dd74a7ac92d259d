//! Overlay IP commands.

use std::net::Ipv4Addr;

use anyhow::Result;
use clap::{Args, Subcommand};
use containerops_alloc::{Allocation, Ipam};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// IP commands.
#[derive(Debug, Args)]
pub struct IpCommand {
    #[command(subcommand)]
    command: IpSubcommand,
}

#[derive(Debug, Subcommand)]
enum IpSubcommand {
    /// Allocate (or look up) the overlay IP of a hostname.
    Allocate(AllocateIpArgs),

    /// Release the overlay IP held by a hostname.
    Release(ReleaseIpArgs),

    /// List all IP bindings of a network.
    List(ListIpArgs),
}

#[derive(Debug, Args)]
struct AllocateIpArgs {
    /// Network name.
    network: String,

    /// Hostname to allocate for.
    hostname: String,

    /// Overlay range, e.g. 10.2.57.0/24.
    #[arg(long)]
    cidr: String,

    /// Bind this exact address instead of picking the lowest free one.
    #[arg(long)]
    ip: Option<String>,
}

#[derive(Debug, Args)]
struct ReleaseIpArgs {
    /// Network name.
    network: String,

    /// Hostname to release.
    hostname: String,
}

#[derive(Debug, Args)]
struct ListIpArgs {
    /// Network name.
    network: String,
}

impl IpCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            IpSubcommand::Allocate(args) => allocate_ip(ctx, args),
            IpSubcommand::Release(args) => release_ip(ctx, args),
            IpSubcommand::List(args) => list_ips(ctx, args),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct IpRow {
    #[tabled(rename = "Hostname")]
    hostname: String,

    #[tabled(rename = "IP")]
    ip: Ipv4Addr,

    #[tabled(rename = "Allocated")]
    allocated_at: String,
}

impl IpRow {
    fn new(hostname: String, allocation: Allocation<Ipv4Addr>) -> Self {
        Self {
            hostname,
            ip: allocation.value,
            allocated_at: allocation.allocated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AllocatedIp<'a> {
    network: &'a str,
    hostname: &'a str,
    ip: Ipv4Addr,
}

/// Result of a release; `ip` is the address that was freed, if any.
#[derive(Debug, Serialize)]
pub(super) struct Released<'a> {
    pub network: &'a str,
    pub hostname: &'a str,
    pub ip: Option<Ipv4Addr>,
}

fn allocate_ip(ctx: CommandContext, args: AllocateIpArgs) -> Result<()> {
    let ipam = Ipam::new(ctx.store());
    let ip = ipam
        .allocate(&args.network, &args.hostname, &args.cidr, args.ip.as_deref(), true)?
        .ok_or_else(|| anyhow::anyhow!("allocator returned no address for {}", args.hostname))?;

    match ctx.format {
        OutputFormat::Table => {
            print_success(&format!("{} in {} has IP {}", args.hostname, args.network, ip))
        }
        OutputFormat::Json => print_single(&AllocatedIp {
            network: &args.network,
            hostname: &args.hostname,
            ip,
        }),
    }
    Ok(())
}

fn release_ip(ctx: CommandContext, args: ReleaseIpArgs) -> Result<()> {
    let released = Ipam::new(ctx.store()).release(&args.network, &args.hostname)?;

    match (ctx.format, released) {
        (OutputFormat::Json, ip) => print_single(&Released {
            network: &args.network,
            hostname: &args.hostname,
            ip,
        }),
        (OutputFormat::Table, Some(ip)) => {
            print_success(&format!("Released {} from {}", ip, args.hostname))
        }
        (OutputFormat::Table, None) => {
            print_info(&format!("{} held no IP in {}", args.hostname, args.network))
        }
    }
    Ok(())
}

fn list_ips(ctx: CommandContext, args: ListIpArgs) -> Result<()> {
    let rows: Vec<IpRow> = Ipam::new(ctx.store())
        .list(&args.network)?
        .into_iter()
        .map(|(hostname, allocation)| IpRow::new(hostname, allocation))
        .collect();

    print_output(&rows, ctx.format);
    Ok(())
}

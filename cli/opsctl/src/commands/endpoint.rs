//! Endpoint commands.

use std::net::Ipv4Addr;

use anyhow::Result;
use clap::{Args, Subcommand};
use containerops_alloc::{
    EndpointAllocator, EndpointRequest, NetworkSpec, DEFAULT_UNDERLAY_PORT_RANGE,
};
use serde::Serialize;

use crate::output::{print_single, print_success, OutputFormat};

use super::{parse_port_range, CommandContext};

/// Endpoint commands.
#[derive(Debug, Args)]
pub struct EndpointCommand {
    #[command(subcommand)]
    command: EndpointSubcommand,
}

#[derive(Debug, Subcommand)]
enum EndpointSubcommand {
    /// Allocate the overlay IP and underlay port of an endpoint.
    Allocate(AllocateEndpointArgs),

    /// Release both resources of an endpoint.
    Release(ReleaseEndpointArgs),
}

#[derive(Debug, Args)]
struct EndpointArgs {
    /// Network name.
    network: String,

    /// Endpoint hostname; must end with the network's DNS domain.
    hostname: String,

    /// Machine the endpoint runs on.
    #[arg(long)]
    machine: String,

    /// DNS domain of the network.
    #[arg(long)]
    dns_domain: String,
}

#[derive(Debug, Args)]
struct AllocateEndpointArgs {
    #[command(flatten)]
    endpoint: EndpointArgs,

    /// Overlay range, e.g. 10.2.57.0/24.
    #[arg(long)]
    cidr: String,

    /// Underlay port range as LOW-HIGH.
    #[arg(long, value_parser = parse_port_range, default_value = "12500-13000")]
    port_range: (u16, u16),

    /// Bind this exact overlay address.
    #[arg(long)]
    ip: Option<String>,

    /// Use this underlay port instead of allocating one (0 = kernel-assigned).
    #[arg(long)]
    underlay_port: Option<u16>,
}

#[derive(Debug, Args)]
struct ReleaseEndpointArgs {
    #[command(flatten)]
    endpoint: EndpointArgs,
}

impl EndpointCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            EndpointSubcommand::Allocate(args) => allocate_endpoint(ctx, args),
            EndpointSubcommand::Release(args) => release_endpoint(ctx, args),
        }
    }
}

#[derive(Debug, Serialize)]
struct AllocatedEndpoint<'a> {
    network: &'a str,
    hostname: &'a str,
    machine: &'a str,
    ip: Ipv4Addr,
    underlay_port: u16,
}

fn network_spec(ctx: &CommandContext, args: &EndpointArgs, cidr: &str, ports: (u16, u16)) -> NetworkSpec {
    NetworkSpec {
        name: args.network.clone(),
        state_dir: ctx.state_dir.clone(),
        dns_domain: args.dns_domain.clone(),
        cidr: cidr.to_string(),
        underlay_port_range: ports,
    }
}

fn allocate_endpoint(ctx: CommandContext, args: AllocateEndpointArgs) -> Result<()> {
    let endpoint = &args.endpoint;
    let network = network_spec(&ctx, endpoint, &args.cidr, args.port_range);

    let mut request = EndpointRequest::new(&endpoint.hostname, &endpoint.machine);
    if let Some(ip) = args.ip.as_deref() {
        request = request.with_ip(ip);
    }
    if let Some(port) = args.underlay_port {
        request = request.with_underlay_port(port);
    }

    let allocation = EndpointAllocator::new(ctx.allocator)
        .allocate_endpoint(&network, &request)?
        .ok_or_else(|| anyhow::anyhow!("no allocation returned for {}", endpoint.hostname))?;

    match ctx.format {
        OutputFormat::Table => print_success(&format!(
            "{} has IP {} and underlay port {}",
            endpoint.hostname, allocation.ip, allocation.underlay_port
        )),
        OutputFormat::Json => print_single(&AllocatedEndpoint {
            network: &endpoint.network,
            hostname: &endpoint.hostname,
            machine: &endpoint.machine,
            ip: allocation.ip,
            underlay_port: allocation.underlay_port,
        }),
    }
    Ok(())
}

fn release_endpoint(ctx: CommandContext, args: ReleaseEndpointArgs) -> Result<()> {
    let endpoint = &args.endpoint;
    let network = network_spec(&ctx, endpoint, "", DEFAULT_UNDERLAY_PORT_RANGE);
    let request = EndpointRequest::new(&endpoint.hostname, &endpoint.machine).absent();

    EndpointAllocator::new(ctx.allocator).allocate_endpoint(&network, &request)?;

    print_success(&format!("Released resources of {}", endpoint.hostname));
    Ok(())
}

// Allow dead code - accessors and flag helpers are only partly used by the CLI
#![allow(dead_code)]

//! rootwalk - iterative DNS resolver
//!
//! Resolves a hostname by walking the delegation tree itself, starting at a
//! root server and following referrals (glue or nested nameserver lookups)
//! until a server answers authoritatively. No recursive resolver is involved.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ROOTWALK                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Resolver        ←── referral loop, glue / NS sub-resolution │
//! │  Codec           ←── query encoding, reply parsing           │
//! │  Arena           ←── checkpointed scratch for every reply    │
//! │  UDP Transport   ←── one datagram out, one datagram back     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

mod arena;
mod config;
mod dns;
mod error;
mod resolver;
mod strings;

#[cfg(test)]
mod tests;

use config::ResolverConfig;
use dns::transport::UdpTransport;
use resolver::Resolver;

/// rootwalk - resolve a hostname from the root servers down
#[derive(Parser, Debug)]
#[command(name = "rootwalk")]
#[command(author = "rootwalk Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Iterative DNS resolver that walks delegations from the root", long_about = None)]
struct Args {
    /// Hostname to resolve
    hostname: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from an IPv6 root server
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Root server to start from (replaces the default seed of its family)
    #[arg(long)]
    root: Option<IpAddr>,

    /// Destination port for queries
    #[arg(long)]
    port: Option<u16>,

    /// Receive timeout per query, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum nested nameserver/CNAME resolutions
    #[arg(long)]
    max_depth: Option<usize>,

    /// Return CNAME answers as-is instead of resolving their target
    #[arg(long)]
    no_follow_cname: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for the answer
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    info!("🌐 rootwalk v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &args.config {
        Some(path) => ResolverConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    // Override config with CLI args
    let use_ipv6 = args.ipv6 || config.use_ipv6;
    let follow_cname = config.follow_cname && !args.no_follow_cname;
    let config = config
        .with_ipv6(use_ipv6)
        .with_root(args.root)
        .with_port(args.port)
        .with_timeout_secs(args.timeout)
        .with_max_depth(args.max_depth)
        .with_follow_cname(follow_cname);

    config.validate()?;

    debug!("⚙️  Configuration: {:?}", config);

    let transport = UdpTransport::new(config.timeout());
    let mut resolver = Resolver::new(transport, config);

    let result = resolver.resolve(&args.hostname);
    resolver.release();
    let records = result?;

    if records.is_empty() {
        anyhow::bail!("{} has no A, AAAA or CNAME records", args.hostname);
    }

    for record in &records {
        println!("{}", record);
    }

    Ok(())
}

//! Resolver Configuration
//!
//! Seed servers, limits and transport settings. Defaults work out of the box;
//! a TOML file and command-line flags can override any of them.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use crate::arena::DEFAULT_CAPACITY;
use crate::dns::wire::{
    DNS_MAX_PACKET_SIZE, DNS_PORT, ROOT_SERVER_A_V4, ROOT_SERVER_A_V6, ROOT_SERVER_E_V4,
    ROOT_SERVER_E_V6,
};

/// Main configuration for the resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    // === Seeds ===

    /// IPv4 root servers, first one is queried
    pub root_servers_v4: Vec<Ipv4Addr>,

    /// IPv6 root servers, first one is queried
    pub root_servers_v6: Vec<Ipv6Addr>,

    /// Start the walk from an IPv6 root (and prefer IPv6 glue)
    pub use_ipv6: bool,

    // === Transport ===

    /// Destination port for every query
    pub port: u16,

    /// Receive timeout per query (seconds)
    pub timeout_secs: u64,

    // === Limits ===

    /// Bytes of arena backing one resolution
    pub arena_capacity: usize,

    /// Maximum nesting of nameserver and CNAME sub-resolutions
    pub max_depth: usize,

    /// Maximum referrals followed by a single (sub-)resolution
    pub max_referrals: usize,

    // === Behaviour ===

    /// Restart from the root for the target of a CNAME-only answer
    pub follow_cname: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            root_servers_v4: vec![ROOT_SERVER_A_V4, ROOT_SERVER_E_V4],
            root_servers_v6: vec![ROOT_SERVER_A_V6, ROOT_SERVER_E_V6],
            use_ipv6: false,

            port: DNS_PORT,
            timeout_secs: 5,

            arena_capacity: DEFAULT_CAPACITY,
            max_depth: 8,
            max_referrals: 32,

            follow_cname: true,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_ipv6(mut self, use_ipv6: bool) -> Self {
        self.use_ipv6 = use_ipv6;
        self
    }

    /// Put `root` in front of the seed list of its family
    pub fn with_root(mut self, root: Option<IpAddr>) -> Self {
        match root {
            Some(IpAddr::V4(v4)) => {
                self.root_servers_v4.insert(0, v4);
                self.use_ipv6 = false;
            }
            Some(IpAddr::V6(v6)) => {
                self.root_servers_v6.insert(0, v6);
                self.use_ipv6 = true;
            }
            None => {}
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.timeout_secs = secs;
        }
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        if let Some(depth) = depth {
            self.max_depth = depth;
        }
        self
    }

    pub fn with_follow_cname(mut self, follow: bool) -> Self {
        self.follow_cname = follow;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Seed server for the configured address family
    pub fn root_server(&self) -> Option<IpAddr> {
        if self.use_ipv6 {
            self.root_servers_v6.first().copied().map(IpAddr::V6)
        } else {
            self.root_servers_v4.first().copied().map(IpAddr::V4)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.root_server().is_none() {
            anyhow::bail!(
                "no {} root server configured",
                if self.use_ipv6 { "IPv6" } else { "IPv4" }
            );
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }

        if self.max_referrals == 0 {
            anyhow::bail!("max_referrals must be greater than zero");
        }

        // Room for one full datagram plus the names decoded from it
        let min_arena = DNS_MAX_PACKET_SIZE * 8;
        if self.arena_capacity < min_arena {
            anyhow::bail!(
                "arena_capacity ({}) must be at least {} bytes",
                self.arena_capacity,
                min_arena
            );
        }

        Ok(())
    }
}

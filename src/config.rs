// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Load-time configuration: which role this process plays, which PCI
// instance and character device it binds to, and the region/ring sizing
// both peers must agree on out of band.

use clap::{Parser, ValueEnum};

use crate::port::Role as PortRole;
use crate::region::{DEFAULT_REGION_SIZE, DEFAULT_RING_CAPACITY};

/// `clap`-facing mirror of `port::Role`: kept distinct so the CLI surface
/// doesn't force a `clap` dependency onto callers of the core crate who
/// only want `port::Role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    Host,
    Guest,
}

impl From<Role> for PortRole {
    fn from(r: Role) -> Self {
        match r {
            Role::Host => PortRole::Host,
            Role::Guest => PortRole::Guest,
        }
    }
}

/// Parsed load-time parameters for one endpoint attachment.
#[derive(Debug, Parser)]
#[command(name = "ivshm-msg", version, about = "ivshmem messaging substrate demo")]
pub struct Config {
    /// Which side of the region this process plays.
    #[arg(long, value_enum)]
    pub role: Role,

    /// Selects one ivshmem device instance by name suffix.
    #[arg(long, default_value = "0")]
    pub pci_id: String,

    /// Character device name this endpoint is exposed under.
    #[arg(long, default_value = "ivshm0")]
    pub device_name: String,

    /// This peer's node id, echoed in every message's `src_node`.
    #[arg(long)]
    pub node_id: u32,

    /// The remote peer's node id; messages from any other source are
    /// dropped.
    #[arg(long)]
    pub remote_node_id: u32,

    /// Record capacity per ring. Must match the peer's configuration.
    #[arg(long, default_value_t = DEFAULT_RING_CAPACITY)]
    pub ring_capacity: u32,

    /// Total mapped region size in bytes. Must match the peer's
    /// configuration and fit at least two rings, two notifiers and a
    /// non-empty arena.
    #[arg(long, default_value_t = DEFAULT_REGION_SIZE)]
    pub region_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_conversion_matches_port_role() {
        assert_eq!(PortRole::from(Role::Host), PortRole::Host);
        assert_eq!(PortRole::from(Role::Guest), PortRole::Guest);
    }

    #[test]
    fn parses_minimal_required_arguments() {
        let cfg = Config::parse_from([
            "ivshm-msg",
            "--role",
            "host",
            "--node-id",
            "1",
            "--remote-node-id",
            "2",
        ]);
        assert_eq!(cfg.role, Role::Host);
        assert_eq!(cfg.node_id, 1);
        assert_eq!(cfg.ring_capacity, DEFAULT_RING_CAPACITY);
    }
}

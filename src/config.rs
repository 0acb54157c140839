//! Required configuration (spec §6.2).
//!
//! `HW_ADDR_TABLE` itself is represented by [`crate::AddressMap`], not by
//! this struct — it is supplied separately since its size is the
//! compile-time mesh node count `N`, not a runtime value.
//!
//! `UPSTREAM_SSID`/`UPSTREAM_PSK` are deliberately absent: those
//! credentials are handed to the Wi-Fi association collaborator and are
//! never read or stored by the routing core (spec §1, §6.2).

use crate::NodeId;

/// Recommended values for the three protocol timing constants, mirroring
/// how region-independent LoRaWAN defaults are grouped separately from
/// the runtime-overridable [`Config`].
pub mod defaults {
    pub const HELLO_INTERVAL_MS: u32 = 2_000;
    pub const ROUTE_TIMEOUT_MS: u32 = 10_000;
    pub const MAX_TTL: u8 = 10;
}

/// Runtime configuration for one node.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Reserved id of the off-mesh collector, reachable only via UDP.
    pub sink_id: NodeId,
    /// IPv4 address of the sink's UDP listener.
    pub sink_ip: core::net::Ipv4Addr,
    /// UDP port of the sink's listener.
    pub sink_udp_port: u16,
    /// Period between broadcast HELLOs.
    pub hello_interval_ms: u32,
    /// Route entry aging timeout.
    pub route_timeout_ms: u32,
    /// TTL an originator stamps on a new frame.
    pub max_ttl: u8,
}

impl Config {
    /// A node is "off-mesh" (the sink) if its id matches [`Self::sink_id`].
    pub fn is_sink(&self, id: NodeId) -> bool {
        id == self.sink_id
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sink_id: 4,
            sink_ip: core::net::Ipv4Addr::new(0, 0, 0, 0),
            sink_udp_port: 0,
            hello_interval_ms: defaults::HELLO_INTERVAL_MS,
            route_timeout_ms: defaults::ROUTE_TIMEOUT_MS,
            max_ttl: defaults::MAX_TTL,
        }
    }
}

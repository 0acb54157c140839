//! Hybrid AODV-style mesh routing core for small FANET nodes.
//!
//! This crate is the routing/forwarding subsystem only: frame codec,
//! route discovery and maintenance, TTL-based flooding control, duplicate
//! suppression, end-to-end ack relay, and the radio/UDP transport
//! selection logic. Sensor payload production, Wi-Fi association, JSON
//! formatting, and provisioning are external collaborators — this crate
//! treats application payload bytes as opaque except for the few fields
//! the data-plane forwarder is contractually required to read and mutate
//! (see [`forward`]).
//!
//! The crate builds `no_std` by default; enable the `std` feature to pull
//! in [`sim`], a set of in-memory transport/clock fakes used by the
//! integration tests.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod address_map;
pub mod codec;
pub mod config;
pub mod control;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod forward;
pub mod route;
pub mod scheduler;
pub mod transport;

#[cfg(feature = "std")]
pub mod sim;

pub use address_map::AddressMap;
pub use config::Config;
pub use error::CoreError;

/// A node's small integer id, `[0, N)`, plus the reserved
/// [`config::Config::sink_id`] sentinel used in application-facing APIs.
/// Mesh-internal tables only ever index `[0, N)`.
pub type NodeId = u8;

/// 48-bit radio hardware address.
pub type HwAddr = [u8; 6];

/// Broadcast hardware address: every mesh frame addressed here goes out
/// on the radio broadcast channel rather than to a specific peer.
pub const BROADCAST_HW_ADDR: HwAddr = [0xff; 6];

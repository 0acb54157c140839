//! Crate-wide error types.
//!
//! Per the forwarding contract, almost all error conditions are absorbed
//! locally (logged and dropped) rather than returned to a caller. The
//! variants here are the ones that do cross an API boundary: transport
//! failures the selector must react to, and the one fatal boot-time error.

use core::fmt;

/// Errors that can be observed by a caller of this crate.
///
/// Everything else described in the forwarding design (malformed frames,
/// TTL expiry, duplicate suppression, missing routes) is handled inside
/// [`crate::engine::Core`] and never surfaces as a `CoreError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// The radio driver rejected registration of a new peer address.
    PeerRegistrationFailed,
    /// A send was attempted on the UDP transport while it reported `is_up() == false`.
    UpstreamDown,
    /// This node's own hardware address was not found in `HW_ADDR_TABLE` at boot.
    ConfigError,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::PeerRegistrationFailed => write!(f, "radio peer registration failed"),
            CoreError::UpstreamDown => write!(f, "upstream UDP link is down"),
            CoreError::ConfigError => write!(f, "local hardware address not in HW_ADDR_TABLE"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}

//! C4: per-destination route table (spec §3.3, §4.2).

use crate::NodeId;

/// Default route entry aging window (spec §3.3's `ROUTE_TIMEOUT_MS`),
/// used by [`Default`] and by tests. The value actually enforced by a
/// given [`RouteTable`] is its `timeout_ms` field, set at construction
/// time from [`crate::config::Config::route_timeout_ms`].
pub const ROUTE_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub next_hop: NodeId,
    pub hop_count: u8,
    pub seq: u32,
    pub last_update_ms: u32,
}

impl RouteEntry {
    fn is_fresh(&self, now_ms: u32, timeout_ms: u32) -> bool {
        self.seq != 0 && now_ms.wrapping_sub(self.last_update_ms) <= timeout_ms
    }
}

/// Fixed-size route table, one slot per possible destination `[0, N)`.
///
/// `N` is the compile-time mesh node count. The sink is reachable only via
/// UDP and never occupies a slot here. `timeout_ms` is the runtime-
/// configurable aging window (spec §3.3, §6.2's `ROUTE_TIMEOUT_MS`).
pub struct RouteTable<const N: usize> {
    entries: [Option<RouteEntry>; N],
    timeout_ms: u32,
}

impl<const N: usize> RouteTable<N> {
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            entries: [None; N],
            timeout_ms,
        }
    }

    fn slot(&self, d: NodeId) -> Option<&Option<RouteEntry>> {
        self.entries.get(d as usize)
    }

    fn slot_mut(&mut self, d: NodeId) -> Option<&mut Option<RouteEntry>> {
        self.entries.get_mut(d as usize)
    }

    /// `true` iff `d` has a currently valid entry (§3.3: `seq != 0` and a
    /// `next_hop` present). Does not itself apply the timeout — call
    /// [`Self::cleanup`] first if staleness matters to the caller.
    pub fn has(&self, d: NodeId) -> bool {
        matches!(self.slot(d), Some(Some(e)) if e.seq != 0)
    }

    pub fn lookup(&self, d: NodeId) -> Option<RouteEntry> {
        self.slot(d).copied().flatten().filter(|e| e.seq != 0)
    }

    /// Offer an update to the route for `d`, applying the replacement rule
    /// (spec §3.3). Returns whether the update was accepted.
    pub fn update(&mut self, d: NodeId, next_hop: NodeId, hop_count: u8, seq: u32, now_ms: u32) -> bool {
        let timeout_ms = self.timeout_ms;
        let Some(slot) = self.slot_mut(d) else {
            return false;
        };

        let accept = match slot {
            None => true,
            Some(existing) => {
                !existing.is_fresh(now_ms, timeout_ms)
                    || seq > existing.seq
                    || (seq == existing.seq && hop_count < existing.hop_count)
            }
        };

        if accept {
            *slot = Some(RouteEntry {
                next_hop,
                hop_count,
                seq,
                last_update_ms: now_ms,
            });
        }

        accept
    }

    pub fn invalidate(&mut self, d: NodeId) {
        if let Some(slot) = self.slot_mut(d) {
            *slot = None;
        }
    }

    /// Idempotent aging sweep: invalidates every entry whose age exceeds
    /// `self.timeout_ms`. Safe to call on every tick.
    pub fn cleanup(&mut self, now_ms: u32) {
        let timeout_ms = self.timeout_ms;
        for slot in self.entries.iter_mut() {
            if let Some(entry) = slot {
                if !entry.is_fresh(now_ms, timeout_ms) {
                    *slot = None;
                }
            }
        }
    }
}

impl<const N: usize> Default for RouteTable<N> {
    fn default() -> Self {
        Self::new(ROUTE_TIMEOUT_MS)
    }
}

//! C5: HELLO / RREQ / RREP / RERR processing (spec §4.3–§4.6, §4.11).
//!
//! Wire encoding for the four control-plane payload bodies (big-endian
//! per spec §6.1), plus the pure decision functions the FSM in
//! [`crate::engine`] drives. These functions take the pieces of state
//! they need directly rather than a `Core` reference, so they stay
//! testable without a transport in the loop.

use crate::codec::CodecError;
use crate::dedup::TimedRingCache;
use crate::route::RouteTable;
use crate::NodeId;

fn need(have: usize, want: usize) -> Result<(), CodecError> {
    if have < want {
        Err(CodecError::TooShort {
            have,
            need: want,
        })
    } else {
        Ok(())
    }
}

/// `{node_id, seq_num}`, broadcast every `HELLO_INTERVAL_MS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloBody {
    pub node_id: NodeId,
    pub seq: u32,
}

impl HelloBody {
    pub const LEN: usize = 5;

    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.node_id;
        buf[1..5].copy_from_slice(&self.seq.to_be_bytes());
        Self::LEN
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        need(bytes.len(), Self::LEN)?;
        Ok(Self {
            node_id: bytes[0],
            seq: u32::from_be_bytes(bytes[1..5].try_into().unwrap()),
        })
    }
}

/// `{source, dest, rreq_id}`. `seq` in spec §4.4 is the same value as
/// `rreq_id`, so it is not duplicated on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RreqBody {
    pub source: NodeId,
    pub dest: NodeId,
    pub rreq_id: u32,
}

impl RreqBody {
    pub const LEN: usize = 6;

    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.source;
        buf[1] = self.dest;
        buf[2..6].copy_from_slice(&self.rreq_id.to_be_bytes());
        Self::LEN
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        need(bytes.len(), Self::LEN)?;
        Ok(Self {
            source: bytes[0],
            dest: bytes[1],
            rreq_id: u32::from_be_bytes(bytes[2..6].try_into().unwrap()),
        })
    }
}

/// `{requester, dest, rreq_id, dest_seq, hop_count}`, always unicast along
/// the reverse path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RrepBody {
    pub requester: NodeId,
    pub dest: NodeId,
    pub rreq_id: u32,
    pub dest_seq: u32,
    pub hop_count: u8,
}

impl RrepBody {
    pub const LEN: usize = 11;

    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.requester;
        buf[1] = self.dest;
        buf[2..6].copy_from_slice(&self.rreq_id.to_be_bytes());
        buf[6..10].copy_from_slice(&self.dest_seq.to_be_bytes());
        buf[10] = self.hop_count;
        Self::LEN
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        need(bytes.len(), Self::LEN)?;
        Ok(Self {
            requester: bytes[0],
            dest: bytes[1],
            rreq_id: u32::from_be_bytes(bytes[2..6].try_into().unwrap()),
            dest_seq: u32::from_be_bytes(bytes[6..10].try_into().unwrap()),
            hop_count: bytes[10],
        })
    }
}

/// `{unreachable_node}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RerrBody {
    pub unreachable_node: NodeId,
}

impl RerrBody {
    pub const LEN: usize = 1;

    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.unreachable_node;
        Self::LEN
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        need(bytes.len(), Self::LEN)?;
        Ok(Self {
            unreachable_node: bytes[0],
        })
    }
}

/// Key type for the reverse-path cache: `(source_id, rreq_id)`.
pub type ReversePathKey = (NodeId, u32);
pub type ReversePathCache = TimedRingCache<ReversePathKey, NodeId, 30>;

/// Outcome of processing an incoming HELLO (spec §4.3): the route-table
/// offer this crate always makes for the neighbour that sent it, plus
/// whether it should additionally be mirrored to the sink over UDP
/// (non-routing telemetry — only when upstream is up).
pub struct HelloOutcome {
    pub route_update_accepted: bool,
}

/// Process a HELLO from neighbour `from_id` carrying `seq`. Unconditionally
/// offers `(d=from_id, next_hop=from_id, hop_count=1, seq)` to the route
/// table; the table's own replacement rule governs acceptance.
pub fn process_hello<const N: usize>(
    route: &mut RouteTable<N>,
    from_id: NodeId,
    seq: u32,
    now_ms: u32,
) -> HelloOutcome {
    let accepted = route.update(from_id, from_id, 1, seq, now_ms);
    HelloOutcome {
        route_update_accepted: accepted,
    }
}

/// What the caller should do after [`process_rreq`] ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RreqAction {
    /// Duplicate `(source_id, rreq_id)` — already suppressed, no route
    /// update, no reply, no rebroadcast.
    Duplicate,
    /// We are the destination: reply with `dest_seq = rreq_id, hop_count = 0`.
    ReplyAsDestination,
    /// A valid route to `dest` exists: reply using that route's
    /// `(seq, hop_count)`.
    ReplyFromRoute { seq: u32, hop_count: u8 },
    /// Neither: rebroadcast the RREQ with `ttl - 1`.
    Rebroadcast { ttl: u8 },
    /// `ttl == 0` on a non-terminal RREQ: drop.
    TtlExpired,
}

/// Receiver-side RREQ processing (spec §4.4, steps 1–7). `prev` is the
/// immediate neighbour the RREQ arrived from (its mesh id, resolved from
/// the frame's `src_mac`); `local_id` is this node's own id.
pub fn process_rreq<const N: usize>(
    route: &mut RouteTable<N>,
    reverse_path: &mut ReversePathCache,
    body: &RreqBody,
    prev: NodeId,
    local_id: NodeId,
    ttl: u8,
    now_ms: u32,
) -> RreqAction {
    let key = (body.source, body.rreq_id);

    if reverse_path.contains(&key, now_ms) {
        return RreqAction::Duplicate;
    }
    reverse_path.insert(key, prev, now_ms);

    // Hop count 1 reflects only the last segment; RREQ does not carry the
    // accumulated source distance. Preserved as a known simplification
    // (spec §9, open question 1).
    route.update(body.source, prev, 1, body.rreq_id, now_ms);

    if body.dest == local_id {
        return RreqAction::ReplyAsDestination;
    }

    if let Some(entry) = route.lookup(body.dest) {
        return RreqAction::ReplyFromRoute {
            seq: entry.seq,
            hop_count: entry.hop_count,
        };
    }

    if ttl > 0 {
        RreqAction::Rebroadcast { ttl: ttl - 1 }
    } else {
        RreqAction::TtlExpired
    }
}

/// What the caller should do after [`process_rrep`] ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrepAction {
    /// We were the requester: the route is now installed; the stuck DATA
    /// will find it on the next send attempt (spec §4.5 step 2 — no
    /// explicit retry queue).
    Terminal,
    /// Forward the RREP unicast to `next_hop` with `ttl - 1`.
    Forward { next_hop: NodeId, ttl: u8 },
    /// No reverse-path entry for `(requester, rreq_id)`, or `ttl == 0`.
    Drop,
}

/// Receiver-side RREP processing (spec §4.5). `prev` is the neighbour the
/// RREP arrived from.
pub fn process_rrep<const N: usize>(
    route: &mut RouteTable<N>,
    reverse_path: &mut ReversePathCache,
    body: &RrepBody,
    prev: NodeId,
    local_id: NodeId,
    ttl: u8,
    now_ms: u32,
) -> RrepAction {
    route.update(body.dest, prev, body.hop_count + 1, body.dest_seq, now_ms);

    if body.requester == local_id {
        return RrepAction::Terminal;
    }

    if ttl == 0 {
        return RrepAction::Drop;
    }

    match reverse_path.get(&(body.requester, body.rreq_id), now_ms) {
        Some(&next_hop) => RrepAction::Forward {
            next_hop,
            ttl: ttl - 1,
        },
        None => RrepAction::Drop,
    }
}

/// RERR processing (spec §4.6): one-hop notice, never rebroadcast.
pub fn process_rerr<const N: usize>(route: &mut RouteTable<N>, body: &RerrBody) {
    route.invalidate(body.unreachable_node);
}

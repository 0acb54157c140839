//! C6: DATA and ACK forwarding (spec §4.7, §4.8).
//!
//! Payload encodings: `DataHeader` is the fixed prefix every DATA payload
//! carries; the remainder (`DataBody`) is a variable-length path list,
//! hop-metrics list, and opaque application tail that the forwarder
//! mutates as it goes.

use alloc::vec::Vec;

use crate::codec::CodecError;
use crate::dedup::TimedRingCache;
use crate::route::RouteTable;
use crate::transport::{Egress, TransportSelector};
use crate::{NodeId, BROADCAST_HW_ADDR};

fn need(have: usize, want: usize) -> Result<(), CodecError> {
    if have < want {
        Err(CodecError::TooShort { have, need: want })
    } else {
        Ok(())
    }
}

/// Fixed 10-byte prefix of every DATA payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub source: NodeId,
    pub destination: NodeId,
    pub packet_id: u32,
    /// `timestamp_ms` at origination — used to compute per-hop delay.
    pub origin_ms: u32,
}

impl DataHeader {
    pub const LEN: usize = 10;

    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.source;
        buf[1] = self.destination;
        buf[2..6].copy_from_slice(&self.packet_id.to_be_bytes());
        buf[6..10].copy_from_slice(&self.origin_ms.to_be_bytes());
        Self::LEN
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        need(bytes.len(), Self::LEN)?;
        Ok(Self {
            source: bytes[0],
            destination: bytes[1],
            packet_id: u32::from_be_bytes(bytes[2..6].try_into().unwrap()),
            origin_ms: u32::from_be_bytes(bytes[6..10].try_into().unwrap()),
        })
    }
}

/// One entry appended to a DATA packet's hop-metrics list as it traverses
/// a link (spec §4.7 step 3): `(u=prev, v=self, rssi, delay_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopMetric {
    pub u: NodeId,
    pub v: NodeId,
    pub rssi: i8,
    pub delay_ms: u32,
}

impl HopMetric {
    const LEN: usize = 7;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = self.u;
        buf[1] = self.v;
        buf[2] = self.rssi as u8;
        buf[3..7].copy_from_slice(&self.delay_ms.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            u: bytes[0],
            v: bytes[1],
            rssi: bytes[2] as i8,
            delay_ms: u32::from_be_bytes(bytes[3..7].try_into().unwrap()),
        }
    }
}

/// The variable-length remainder of a DATA payload: the path taken so
/// far, the per-hop metrics collected so far, and the opaque application
/// bytes the core never interprets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataBody {
    pub path: Vec<NodeId>,
    pub hop_metrics: Vec<HopMetric>,
    pub app_payload: Vec<u8>,
}

impl DataBody {
    /// Append `self` to the path list (spec §4.7 step 3).
    pub fn push_path(&mut self, node: NodeId) {
        self.path.push(node);
    }

    /// Append a hop metric (spec §4.7 step 3).
    pub fn push_hop(&mut self, u: NodeId, v: NodeId, rssi: i8, delay_ms: u32) {
        self.hop_metrics.push(HopMetric {
            u,
            v,
            rssi,
            delay_ms,
        });
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.path.len() as u8);
        buf.extend_from_slice(&self.path);

        buf.push(self.hop_metrics.len() as u8);
        let mut hop_buf = [0u8; HopMetric::LEN];
        for hop in &self.hop_metrics {
            hop.encode_into(&mut hop_buf);
            buf.extend_from_slice(&hop_buf);
        }

        buf.extend_from_slice(&(self.app_payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.app_payload);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = 0usize;

        need(bytes.len(), cursor + 1)?;
        let path_len = bytes[cursor] as usize;
        cursor += 1;
        need(bytes.len(), cursor + path_len)?;
        let path = bytes[cursor..cursor + path_len].to_vec();
        cursor += path_len;

        need(bytes.len(), cursor + 1)?;
        let hop_len = bytes[cursor] as usize;
        cursor += 1;
        let mut hop_metrics = Vec::with_capacity(hop_len);
        for _ in 0..hop_len {
            need(bytes.len(), cursor + HopMetric::LEN)?;
            hop_metrics.push(HopMetric::decode(&bytes[cursor..cursor + HopMetric::LEN]));
            cursor += HopMetric::LEN;
        }

        need(bytes.len(), cursor + 2)?;
        let app_len = u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;
        need(bytes.len(), cursor + app_len)?;
        let app_payload = bytes[cursor..cursor + app_len].to_vec();

        Ok(Self {
            path,
            hop_metrics,
            app_payload,
        })
    }
}

/// `{packet_id, ack_from, destination, orig_source, orig_destination, sent_ts, ack_ts}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckBody {
    pub packet_id: u32,
    pub ack_from: NodeId,
    pub destination: NodeId,
    pub orig_source: NodeId,
    pub orig_destination: NodeId,
    pub sent_ms: u32,
    pub ack_ms: u32,
}

impl AckBody {
    pub const LEN: usize = 16;

    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        buf[0..4].copy_from_slice(&self.packet_id.to_be_bytes());
        buf[4] = self.ack_from;
        buf[5] = self.destination;
        buf[6] = self.orig_source;
        buf[7] = self.orig_destination;
        buf[8..12].copy_from_slice(&self.sent_ms.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ack_ms.to_be_bytes());
        Self::LEN
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        need(bytes.len(), Self::LEN)?;
        Ok(Self {
            packet_id: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            ack_from: bytes[4],
            destination: bytes[5],
            orig_source: bytes[6],
            orig_destination: bytes[7],
            sent_ms: u32::from_be_bytes(bytes[8..12].try_into().unwrap()),
            ack_ms: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        })
    }
}

pub type DataSeenKey = (NodeId, u32);
pub type DataSeenCache = TimedRingCache<DataSeenKey, (), 60>;

pub type AckSeenKey = (u32, NodeId);
pub type AckSeenCache = TimedRingCache<AckSeenKey, (), 40>;

/// Outcome of [`process_data`] (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAction {
    /// `(source, packet_id)` already seen — dropped before annotation.
    Duplicate,
    /// `destination == self`. `emit_ack` is `false` only for the
    /// `packet_id == 0` sentinel (spec §8.3 boundary behaviour).
    DeliverLocally { emit_ack: bool },
    /// `destination == SINK_ID` and upstream UDP is available: hand off.
    HandoffToUpstream,
    /// `destination == SINK_ID`, upstream down: relay-mode fallback.
    RebroadcastToSink { ttl: u8 },
    /// `destination == SINK_ID`, upstream down, and `ttl == 0`: drop.
    SinkTtlExpired,
    /// No valid route to `destination`: originate an RREQ and drop this
    /// packet (the upper layer is responsible for retransmission).
    NoRoute,
    /// Valid route exists: unicast to `route[destination].next_hop`.
    Forward { next_hop: NodeId, ttl: u8 },
    /// Valid route exists but `ttl == 0`.
    TtlExpired,
}

/// Receiver-side DATA processing (spec §4.7). `prev` is the immediate
/// previous hop, `rssi` and `now_ms` feed the hop-metric annotation in
/// step 3. Mutates `body` in place per step 3 regardless of the eventual
/// action, matching the spec's "processed at most once, annotated
/// unconditionally on first processing" semantics.
#[allow(clippy::too_many_arguments)]
pub fn process_data<const N: usize>(
    route: &mut RouteTable<N>,
    data_seen: &mut DataSeenCache,
    header: &DataHeader,
    body: &mut DataBody,
    prev: NodeId,
    local_id: NodeId,
    sink_id: NodeId,
    rssi: i8,
    ttl: u8,
    upstream_up: bool,
    now_ms: u32,
) -> DataAction {
    let key = (header.source, header.packet_id);
    if data_seen.contains(&key, now_ms) {
        return DataAction::Duplicate;
    }
    data_seen.insert(key, (), now_ms);

    let prev_timestamp = body
        .hop_metrics
        .last()
        .map(|h| header.origin_ms.wrapping_add(h.delay_ms))
        .unwrap_or(header.origin_ms);
    let delay_ms = now_ms.wrapping_sub(prev_timestamp);
    body.push_hop(prev, local_id, rssi, delay_ms);
    body.push_path(local_id);

    if header.destination == local_id {
        return DataAction::DeliverLocally {
            emit_ack: header.packet_id != 0,
        };
    }

    if header.destination == sink_id {
        return match TransportSelector::select(sink_id, header.destination, BROADCAST_HW_ADDR, upstream_up) {
            Egress::Udp => DataAction::HandoffToUpstream,
            Egress::Radio if ttl > 0 => DataAction::RebroadcastToSink { ttl: ttl - 1 },
            Egress::Radio => DataAction::SinkTtlExpired,
        };
    }

    match route.lookup(header.destination) {
        None => DataAction::NoRoute,
        Some(entry) => {
            if ttl > 0 {
                DataAction::Forward {
                    next_hop: entry.next_hop,
                    ttl: ttl - 1,
                }
            } else {
                DataAction::TtlExpired
            }
        }
    }
}

/// Outcome of [`process_ack`] (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    Duplicate,
    HandoffToUpstream,
    Rebroadcast { ttl: u8 },
    TtlExpired,
}

pub fn process_ack(
    ack_seen: &mut AckSeenCache,
    body: &AckBody,
    sink_id: NodeId,
    ttl: u8,
    upstream_up: bool,
    now_ms: u32,
) -> AckAction {
    let key = (body.packet_id, body.ack_from);
    if ack_seen.contains(&key, now_ms) {
        return AckAction::Duplicate;
    }
    ack_seen.insert(key, (), now_ms);

    if TransportSelector::select(sink_id, body.destination, BROADCAST_HW_ADDR, upstream_up) == Egress::Udp {
        return AckAction::HandoffToUpstream;
    }

    if ttl > 0 {
        AckAction::Rebroadcast { ttl: ttl - 1 }
    } else {
        AckAction::TtlExpired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header_round_trips() {
        let mut buf = [0u8; DataHeader::LEN];
        let h = DataHeader {
            source: 0,
            destination: 1,
            packet_id: 1,
            origin_ms: 1000,
        };
        h.encode_into(&mut buf);
        assert_eq!(DataHeader::decode(&buf).unwrap(), h);
    }

    #[test]
    fn data_body_round_trips_with_hops_and_path() {
        let mut body = DataBody {
            app_payload: alloc::vec![1, 2, 3],
            ..Default::default()
        };
        body.push_path(0);
        body.push_hop(0, 1, -42, 12);

        let mut buf = Vec::new();
        body.encode_into(&mut buf);
        let decoded = DataBody::decode(&buf).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn ack_body_round_trips() {
        let mut buf = [0u8; AckBody::LEN];
        let ack = AckBody {
            packet_id: 1,
            ack_from: 1,
            destination: 4,
            orig_source: 0,
            orig_destination: 1,
            sent_ms: 10,
            ack_ms: 20,
        };
        ack.encode_into(&mut buf);
        assert_eq!(AckBody::decode(&buf).unwrap(), ack);
    }

    #[test]
    fn direct_delivery_appends_one_hop_and_acks() {
        let mut route: RouteTable<8> = RouteTable::default();
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 1,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 10, false, 5,
        );
        assert_eq!(action, DataAction::DeliverLocally { emit_ack: true });
        assert_eq!(body.hop_metrics.len(), 1);
        assert_eq!(body.hop_metrics[0], HopMetric { u: 0, v: 1, rssi: -50, delay_ms: 5 });
        assert_eq!(body.path, alloc::vec![1]);
    }

    #[test]
    fn packet_id_zero_is_delivered_without_ack() {
        let mut route: RouteTable<8> = RouteTable::default();
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 1,
            packet_id: 0,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 10, false, 5,
        );
        assert_eq!(action, DataAction::DeliverLocally { emit_ack: false });
    }

    #[test]
    fn duplicate_data_is_processed_at_most_once() {
        let mut route: RouteTable<8> = RouteTable::default();
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 9,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let _ = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 10, false, 5,
        );
        assert_eq!(body.hop_metrics.len(), 1);

        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 10, false, 6,
        );
        assert_eq!(action, DataAction::Duplicate);
        assert_eq!(body.hop_metrics.len(), 1, "duplicate must not re-annotate");
    }

    #[test]
    fn sink_destination_with_upstream_hands_off() {
        let mut route: RouteTable<8> = RouteTable::default();
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 4,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 10, true, 5,
        );
        assert_eq!(action, DataAction::HandoffToUpstream);
    }

    #[test]
    fn sink_destination_without_upstream_relays_on_radio() {
        let mut route: RouteTable<8> = RouteTable::default();
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 4,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 3, false, 5,
        );
        assert_eq!(action, DataAction::RebroadcastToSink { ttl: 2 });
    }

    #[test]
    fn no_route_triggers_rreq_and_drop() {
        let mut route: RouteTable<8> = RouteTable::default();
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 2,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 10, false, 5,
        );
        assert_eq!(action, DataAction::NoRoute);
    }

    #[test]
    fn ttl_strictly_decreases_on_forward() {
        let mut route: RouteTable<8> = RouteTable::default();
        route.update(2, 3, 1, 1, 0);
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 2,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 5, false, 5,
        );
        assert_eq!(action, DataAction::Forward { next_hop: 3, ttl: 4 });
    }

    #[test]
    fn ttl_one_is_final_hop_only() {
        let mut route: RouteTable<8> = RouteTable::default();
        route.update(2, 3, 1, 1, 0);
        let mut seen = DataSeenCache::new();
        let header = DataHeader {
            source: 0,
            destination: 2,
            packet_id: 1,
            origin_ms: 0,
        };
        let mut body = DataBody::default();
        let action = process_data(
            &mut route, &mut seen, &header, &mut body, 0, 1, 4, -50, 1, false, 5,
        );
        assert_eq!(action, DataAction::Forward { next_hop: 3, ttl: 0 });
    }

    #[test]
    fn ack_deduped_by_packet_id_and_ack_from() {
        let mut seen = AckSeenCache::new();
        let ack = AckBody {
            packet_id: 1,
            ack_from: 1,
            destination: 4,
            orig_source: 0,
            orig_destination: 1,
            sent_ms: 0,
            ack_ms: 1,
        };
        let first = process_ack(&mut seen, &ack, 4, 10, false, 0);
        assert_ne!(first, AckAction::Duplicate);
        let second = process_ack(&mut seen, &ack, 4, 10, false, 1);
        assert_eq!(second, AckAction::Duplicate);
    }

    #[test]
    fn ack_to_sink_with_upstream_hands_off() {
        let mut seen = AckSeenCache::new();
        let ack = AckBody {
            packet_id: 1,
            ack_from: 1,
            destination: 4,
            orig_source: 0,
            orig_destination: 1,
            sent_ms: 0,
            ack_ms: 1,
        };
        let action = process_ack(&mut seen, &ack, 4, 10, true, 0);
        assert_eq!(action, AckAction::HandoffToUpstream);
    }
}

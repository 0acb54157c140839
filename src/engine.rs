//! C9 + `Core`: the single-threaded event loop's state, and the ingress
//! demultiplexer that dispatches decoded frames into the control plane
//! (C5) or data plane (C6) (spec §2 control flow, §5).
//!
//! `Core` owns every piece of mutable state described in spec §5 (route
//! table, dedup caches, sequence counters, upstream-link flag) and
//! nothing else — the radio driver, UDP socket, and clock stay with the
//! embedding event loop and are passed in by reference on each call, so a
//! `Core` is cheap to construct in isolation per node for tests (spec §9).

use alloc::vec::Vec;

use crate::address_map::AddressMap;
use crate::codec::{CodecError, Frame, FrameType, MAX_TTL};
use crate::config::Config;
use crate::control::{
    self, HelloBody, ReversePathCache, RerrBody, RreqAction, RreqBody, RrepAction, RrepBody,
};
use crate::error::CoreError;
use crate::forward::{
    self, AckAction, AckBody, AckSeenCache, DataAction, DataBody, DataHeader, DataSeenCache,
    HopMetric,
};
use crate::route::RouteTable;
use crate::scheduler::{TickScheduler, UpstreamEdge};
use crate::transport::{Egress, RadioTransport, TransportSelector, UdpTransport};
use crate::{HwAddr, NodeId, BROADCAST_HW_ADDR};

/// A fully-formed outbound frame this node wants sent, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RadioBroadcast(Vec<u8>),
    RadioUnicast(HwAddr, Vec<u8>),
    UdpSend(Vec<u8>),
    /// The 10s-while-down reassociation retry (spec §4.10). The core has
    /// no ability to drive Wi-Fi association itself — this tells the
    /// embedding loop to ask the upstream-link collaborator to retry.
    RequestUpstreamReassociation,
}

/// Data delivered to the local application after a DATA packet reached
/// its destination (this node). Payload production/consumption is an
/// external collaborator (spec §1); this is the handoff point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredData {
    pub source: NodeId,
    pub packet_id: u32,
    pub path: Vec<NodeId>,
    pub hop_metrics: Vec<HopMetric>,
    pub app_payload: Vec<u8>,
}

/// Result of feeding one frame, tick, or outbound send request into
/// [`Core`]: zero or more frames to transmit, and possibly a payload that
/// reached its destination here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepOutcome {
    pub effects: Vec<Effect>,
    pub delivered: Option<DeliveredData>,
}

impl StepOutcome {
    fn with_effect(effect: Effect) -> Self {
        Self {
            effects: alloc::vec![effect],
            delivered: None,
        }
    }
}

/// The routing core for one mesh node. `N` is the compile-time mesh node
/// count (spec §3.1); the sink is never one of the `N` slots.
pub struct Core<'a, const N: usize> {
    address_map: AddressMap<'a>,
    config: Config,
    local_id: NodeId,
    local_mac: HwAddr,

    route: RouteTable<N>,
    reverse_path: ReversePathCache,
    data_seen: DataSeenCache,
    ack_seen: AckSeenCache,

    local_seq: u32,
    packet_counter: u32,
    upstream_up: bool,
    scheduler: TickScheduler,
}

impl<'a, const N: usize> Core<'a, N> {
    /// Boots a `Core`, resolving this host's own `node_id` by matching
    /// `local_mac` against `address_map` (spec §3.1, §7 `ConfigError`).
    pub fn new(
        address_map: AddressMap<'a>,
        config: Config,
        local_mac: HwAddr,
    ) -> Result<Self, CoreError> {
        let local_id = address_map.resolve_self(local_mac)?;
        let hello_interval = config.hello_interval_ms;
        let route_timeout = config.route_timeout_ms;
        Ok(Self {
            address_map,
            config,
            local_id,
            local_mac,
            route: RouteTable::new(route_timeout),
            reverse_path: ReversePathCache::new(),
            data_seen: DataSeenCache::new(),
            ack_seen: AckSeenCache::new(),
            local_seq: 0,
            packet_counter: 0,
            upstream_up: false,
            scheduler: TickScheduler::new(hello_interval),
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn upstream_up(&self) -> bool {
        self.upstream_up
    }

    pub fn route_table(&self) -> &RouteTable<N> {
        &self.route
    }

    fn next_seq(&mut self) -> u32 {
        self.local_seq = self.local_seq.wrapping_add(1);
        self.local_seq
    }

    fn next_packet_id(&mut self) -> u32 {
        self.packet_counter = self.packet_counter.wrapping_add(1);
        self.packet_counter
    }

    fn hw_addr_of(&self, id: NodeId) -> Option<HwAddr> {
        self.address_map.hw_addr(id)
    }

    fn build(&self, ty: FrameType, dst_mac: HwAddr, ttl: u8, payload: &[u8]) -> Vec<u8> {
        Frame::encode_vec(ty, self.local_mac, dst_mac, ttl, payload)
    }

    // ---- control-plane origination -------------------------------------

    /// Originate an RREQ for `dest` (spec §4.4 originator steps). Also
    /// called internally whenever the data plane hits `NoRoute`.
    pub fn originate_rreq(&mut self, dest: NodeId, now_ms: u32) -> StepOutcome {
        let rreq_id = self.next_seq();
        let body = RreqBody {
            source: self.local_id,
            dest,
            rreq_id,
        };
        log::debug!("originating RREQ for dest={dest} rreq_id={rreq_id}");
        let mut buf = [0u8; RreqBody::LEN];
        body.encode_into(&mut buf);
        let frame = self.build(FrameType::RReq, BROADCAST_HW_ADDR, self.config.max_ttl, &buf);
        StepOutcome::with_effect(Effect::RadioBroadcast(frame))
    }

    /// Originate a new DATA packet to `destination` (upper-layer send
    /// request). `packet_id == 0` is the "no ack wanted" sentinel (spec
    /// §8.3); pass [`Self::next_packet_id`]'s result, or `0` explicitly,
    /// as the caller sees fit.
    pub fn send_data(
        &mut self,
        destination: NodeId,
        packet_id: u32,
        app_payload: Vec<u8>,
        now_ms: u32,
    ) -> StepOutcome {
        let header = DataHeader {
            source: self.local_id,
            destination,
            packet_id,
            origin_ms: now_ms,
        };
        // Record our own origination so a looped-back copy of this packet
        // is dropped as a duplicate rather than reprocessed.
        self.data_seen.insert((header.source, packet_id), (), now_ms);

        if destination == self.config.sink_id {
            return self.send_data_to_sink(header, DataBody::default());
        }

        match self.route.lookup(destination) {
            None => self.originate_rreq(destination, now_ms),
            Some(entry) => {
                let Some(next_hop_mac) = self.hw_addr_of(entry.next_hop) else {
                    log::warn!("route to {destination} names unknown next hop {}", entry.next_hop);
                    return StepOutcome::default();
                };
                let mut payload = Vec::new();
                header.encode_into_vec(&mut payload);
                DataBody {
                    app_payload,
                    ..Default::default()
                }
                .encode_into(&mut payload);
                let frame = self.build(FrameType::Data, next_hop_mac, self.config.max_ttl, &payload);
                StepOutcome::with_effect(Effect::RadioUnicast(next_hop_mac, frame))
            }
        }
    }

    fn send_data_to_sink(&mut self, header: DataHeader, body: DataBody) -> StepOutcome {
        let mut payload = Vec::new();
        header.encode_into_vec(&mut payload);
        body.encode_into(&mut payload);
        let frame = self.build(FrameType::Data, BROADCAST_HW_ADDR, self.config.max_ttl, &payload);

        match TransportSelector::select(self.config.sink_id, self.config.sink_id, BROADCAST_HW_ADDR, self.upstream_up)
        {
            Egress::Udp => StepOutcome::with_effect(Effect::UdpSend(frame)),
            Egress::Radio => StepOutcome::with_effect(Effect::RadioBroadcast(frame)),
        }
    }

    // ---- ingress demultiplexer (C9) ------------------------------------

    /// Feed one frame received on the radio transport.
    pub fn on_radio_frame(&mut self, bytes: &[u8], rssi: i8, now_ms: u32) -> StepOutcome {
        self.on_frame(bytes, rssi, now_ms, Origin::Radio)
    }

    /// Feed one frame received on the UDP transport (only the sink is
    /// expected to send anything back down this path in the current
    /// design, but the demultiplexer does not special-case that).
    pub fn on_udp_frame(&mut self, bytes: &[u8], now_ms: u32) -> StepOutcome {
        self.on_frame(bytes, 0, now_ms, Origin::Udp)
    }

    fn on_frame(&mut self, bytes: &[u8], rssi: i8, now_ms: u32, _origin: Origin) -> StepOutcome {
        let frame = match Frame::decode(bytes) {
            Ok(f) => f,
            Err(CodecError::TooShort { have, need }) => {
                log::trace!("dropping malformed frame: have {have}, need {need}");
                return StepOutcome::default();
            }
            Err(CodecError::UnknownFrameType { value }) => {
                log::trace!("dropping frame with unknown type byte {value}");
                return StepOutcome::default();
            }
        };

        let Some(prev) = self.address_map.node_id(frame.src_mac()) else {
            log::trace!("dropping frame from unprovisioned address");
            return StepOutcome::default();
        };

        match frame.ty() {
            FrameType::Hello => self.handle_hello(frame.payload(), now_ms),
            FrameType::RReq => self.handle_rreq(frame.payload(), prev, frame.ttl(), now_ms),
            FrameType::RRep => self.handle_rrep(frame.payload(), prev, frame.ttl(), now_ms),
            FrameType::RErr => self.handle_rerr(frame.payload()),
            FrameType::Data => self.handle_data(frame.payload(), prev, rssi, frame.ttl(), now_ms),
            FrameType::Ack => self.handle_ack(frame.payload(), frame.ttl(), now_ms),
        }
    }

    fn handle_hello(&mut self, payload: &[u8], now_ms: u32) -> StepOutcome {
        let Ok(body) = HelloBody::decode(payload) else {
            log::trace!("dropping malformed HELLO");
            return StepOutcome::default();
        };
        control::process_hello(&mut self.route, body.node_id, body.seq, now_ms);
        StepOutcome::default()
    }

    fn handle_rreq(&mut self, payload: &[u8], prev: NodeId, ttl: u8, now_ms: u32) -> StepOutcome {
        let Ok(body) = RreqBody::decode(payload) else {
            log::trace!("dropping malformed RREQ");
            return StepOutcome::default();
        };

        let action = control::process_rreq(
            &mut self.route,
            &mut self.reverse_path,
            &body,
            prev,
            self.local_id,
            ttl,
            now_ms,
        );

        match action {
            RreqAction::Duplicate | RreqAction::TtlExpired => StepOutcome::default(),
            RreqAction::ReplyAsDestination => {
                self.reply_rrep(&body, prev, body.rreq_id, 0, now_ms)
            }
            RreqAction::ReplyFromRoute { seq, hop_count } => {
                self.reply_rrep(&body, prev, seq, hop_count, now_ms)
            }
            RreqAction::Rebroadcast { ttl } => {
                let mut buf = [0u8; RreqBody::LEN];
                body.encode_into(&mut buf);
                let frame = self.build(FrameType::RReq, BROADCAST_HW_ADDR, ttl, &buf);
                StepOutcome::with_effect(Effect::RadioBroadcast(frame))
            }
        }
    }

    fn reply_rrep(
        &self,
        rreq: &RreqBody,
        prev: NodeId,
        dest_seq: u32,
        hop_count: u8,
        _now_ms: u32,
    ) -> StepOutcome {
        let Some(prev_mac) = self.hw_addr_of(prev) else {
            log::warn!("reverse-path hop {prev} has no known hw address");
            return StepOutcome::default();
        };
        let rrep = RrepBody {
            requester: rreq.source,
            dest: rreq.dest,
            rreq_id: rreq.rreq_id,
            dest_seq,
            hop_count,
        };
        let mut buf = [0u8; RrepBody::LEN];
        rrep.encode_into(&mut buf);
        let frame = self.build(FrameType::RRep, prev_mac, self.config.max_ttl, &buf);
        StepOutcome::with_effect(Effect::RadioUnicast(prev_mac, frame))
    }

    fn handle_rrep(&mut self, payload: &[u8], prev: NodeId, ttl: u8, now_ms: u32) -> StepOutcome {
        let Ok(body) = RrepBody::decode(payload) else {
            log::trace!("dropping malformed RREP");
            return StepOutcome::default();
        };

        let action = control::process_rrep(
            &mut self.route,
            &mut self.reverse_path,
            &body,
            prev,
            self.local_id,
            ttl,
            now_ms,
        );

        match action {
            RrepAction::Terminal | RrepAction::Drop => StepOutcome::default(),
            RrepAction::Forward { next_hop, ttl } => {
                let Some(next_hop_mac) = self.hw_addr_of(next_hop) else {
                    log::warn!("RREP forward target {next_hop} has no known hw address");
                    return StepOutcome::default();
                };
                let mut buf = [0u8; RrepBody::LEN];
                body.encode_into(&mut buf);
                let frame = self.build(FrameType::RRep, next_hop_mac, ttl, &buf);
                StepOutcome::with_effect(Effect::RadioUnicast(next_hop_mac, frame))
            }
        }
    }

    fn handle_rerr(&mut self, payload: &[u8]) -> StepOutcome {
        let Ok(body) = RerrBody::decode(payload) else {
            log::trace!("dropping malformed RERR");
            return StepOutcome::default();
        };
        control::process_rerr(&mut self.route, &body);
        StepOutcome::default()
    }

    fn handle_data(
        &mut self,
        payload: &[u8],
        prev: NodeId,
        rssi: i8,
        ttl: u8,
        now_ms: u32,
    ) -> StepOutcome {
        let Ok(header) = DataHeader::decode(payload) else {
            log::trace!("dropping malformed DATA header");
            return StepOutcome::default();
        };
        let Ok(mut body) = DataBody::decode(&payload[DataHeader::LEN..]) else {
            log::trace!("dropping malformed DATA body");
            return StepOutcome::default();
        };

        let action = forward::process_data(
            &mut self.route,
            &mut self.data_seen,
            &header,
            &mut body,
            prev,
            self.local_id,
            self.config.sink_id,
            rssi,
            ttl,
            self.upstream_up,
            now_ms,
        );

        match action {
            DataAction::Duplicate | DataAction::SinkTtlExpired | DataAction::TtlExpired => {
                StepOutcome::default()
            }
            DataAction::NoRoute => self.originate_rreq(header.destination, now_ms),
            DataAction::DeliverLocally { emit_ack } => {
                let mut outcome = StepOutcome {
                    effects: Vec::new(),
                    delivered: Some(DeliveredData {
                        source: header.source,
                        packet_id: header.packet_id,
                        path: body.path.clone(),
                        hop_metrics: body.hop_metrics.clone(),
                        app_payload: body.app_payload.clone(),
                    }),
                };
                if emit_ack {
                    let ack = AckBody {
                        packet_id: header.packet_id,
                        ack_from: self.local_id,
                        destination: self.config.sink_id,
                        orig_source: header.source,
                        orig_destination: header.destination,
                        sent_ms: header.origin_ms,
                        ack_ms: now_ms,
                    };
                    let mut buf = [0u8; AckBody::LEN];
                    ack.encode_into(&mut buf);
                    let effect = if self.upstream_up {
                        Effect::UdpSend(self.build(FrameType::Ack, BROADCAST_HW_ADDR, self.config.max_ttl, &buf))
                    } else {
                        Effect::RadioBroadcast(self.build(
                            FrameType::Ack,
                            BROADCAST_HW_ADDR,
                            self.config.max_ttl,
                            &buf,
                        ))
                    };
                    outcome.effects.push(effect);
                }
                outcome
            }
            DataAction::HandoffToUpstream => {
                let mut payload = Vec::new();
                header.encode_into_vec(&mut payload);
                body.encode_into(&mut payload);
                let frame = self.build(FrameType::Data, BROADCAST_HW_ADDR, MAX_TTL, &payload);
                StepOutcome::with_effect(Effect::UdpSend(frame))
            }
            DataAction::RebroadcastToSink { ttl } => {
                let mut payload = Vec::new();
                header.encode_into_vec(&mut payload);
                body.encode_into(&mut payload);
                let frame = self.build(FrameType::Data, BROADCAST_HW_ADDR, ttl, &payload);
                StepOutcome::with_effect(Effect::RadioBroadcast(frame))
            }
            DataAction::Forward { next_hop, ttl } => {
                let Some(next_hop_mac) = self.hw_addr_of(next_hop) else {
                    log::warn!("forward target {next_hop} has no known hw address");
                    return StepOutcome::default();
                };
                let mut payload = Vec::new();
                header.encode_into_vec(&mut payload);
                body.encode_into(&mut payload);
                let frame = self.build(FrameType::Data, next_hop_mac, ttl, &payload);
                StepOutcome::with_effect(Effect::RadioUnicast(next_hop_mac, frame))
            }
        }
    }

    fn handle_ack(&mut self, payload: &[u8], ttl: u8, now_ms: u32) -> StepOutcome {
        let Ok(body) = AckBody::decode(payload) else {
            log::trace!("dropping malformed ACK");
            return StepOutcome::default();
        };

        let action = forward::process_ack(
            &mut self.ack_seen,
            &body,
            self.config.sink_id,
            ttl,
            self.upstream_up,
            now_ms,
        );

        match action {
            AckAction::Duplicate | AckAction::TtlExpired => StepOutcome::default(),
            AckAction::HandoffToUpstream => {
                let mut buf = [0u8; AckBody::LEN];
                body.encode_into(&mut buf);
                let frame = self.build(FrameType::Ack, BROADCAST_HW_ADDR, MAX_TTL, &buf);
                StepOutcome::with_effect(Effect::UdpSend(frame))
            }
            AckAction::Rebroadcast { ttl } => {
                let mut buf = [0u8; AckBody::LEN];
                body.encode_into(&mut buf);
                let frame = self.build(FrameType::Ack, BROADCAST_HW_ADDR, ttl, &buf);
                StepOutcome::with_effect(Effect::RadioBroadcast(frame))
            }
        }
    }

    // ---- tick scheduler (C8) -------------------------------------------

    /// Drive the periodic timer. `upstream_is_up` is this call's fresh
    /// sample of the UDP transport's `is_up()`, taken by the caller.
    pub fn on_tick(&mut self, now_ms: u32, upstream_is_up: bool) -> StepOutcome {
        let actions = self.scheduler.due(now_ms);
        let mut outcome = StepOutcome::default();

        if actions.hello {
            let seq = self.next_seq();
            let body = HelloBody {
                node_id: self.local_id,
                seq,
            };
            let mut buf = [0u8; HelloBody::LEN];
            body.encode_into(&mut buf);
            let frame = self.build(FrameType::Hello, BROADCAST_HW_ADDR, self.config.max_ttl, &buf);
            outcome.effects.push(Effect::RadioBroadcast(frame.clone()));
            if self.upstream_up {
                outcome.effects.push(Effect::UdpSend(frame));
            }
        }

        if actions.route_cleanup {
            self.route.cleanup(now_ms);
        }

        if actions.upstream_probe_sample {
            match self.scheduler.observe_upstream(now_ms, upstream_is_up) {
                Some(UpstreamEdge::Up) => {
                    log::info!("upstream link up");
                    self.upstream_up = true;
                }
                Some(UpstreamEdge::Down) => {
                    log::info!("upstream link down");
                    self.upstream_up = false;
                }
                None => {}
            }
        }

        if !self.upstream_up && self.scheduler.reassociate_due(now_ms) {
            outcome.effects.push(Effect::RequestUpstreamReassociation);
        }

        outcome
    }

    /// Drain a batch of [`Effect`]s into real transport collaborators.
    /// Not used by the pure decision paths above — a convenience for the
    /// embedding event loop (and for tests using [`crate::sim`]) so it
    /// does not have to match on [`Effect`] itself.
    pub fn apply_effects(
        &self,
        effects: &[Effect],
        radio: &mut impl RadioTransport,
        udp: &mut impl UdpTransport,
    ) -> Result<(), CoreError> {
        for effect in effects {
            match effect {
                Effect::RadioBroadcast(frame) => radio.broadcast(frame)?,
                Effect::RadioUnicast(hw_addr, frame) => {
                    radio.register_peer(*hw_addr)?;
                    radio.unicast(*hw_addr, frame)?;
                }
                Effect::UdpSend(frame) => udp.send(frame)?,
                Effect::RequestUpstreamReassociation => {}
            }
        }
        Ok(())
    }
}

enum Origin {
    Radio,
    Udp,
}

impl DataHeader {
    fn encode_into_vec(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; DataHeader::LEN];
        self.encode_into(&mut buf);
        out.extend_from_slice(&buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const TABLE: [HwAddr; 3] = [[0xAA; 6], [0xBB; 6], [0xCC; 6]];

    fn config() -> Config {
        Config {
            sink_id: 4,
            ..Config::default()
        }
    }

    fn core(id: usize) -> Core<'static, 3> {
        let map = AddressMap::new(&TABLE);
        Core::new(map, config(), TABLE[id]).unwrap()
    }

    #[test]
    fn boot_resolves_own_id() {
        let a = core(1);
        assert_eq!(a.local_id(), 1);
    }

    #[test]
    fn direct_delivery_after_hello_installs_route() {
        let mut a = core(0);
        let mut b = core(1);

        // B's hello reaches A: install a route A->B.
        let hello_outcome = b.on_tick(2_000, false);
        let hello_frame = hello_outcome
            .effects
            .iter()
            .find_map(|e| match e {
                Effect::RadioBroadcast(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .expect("hello broadcast");
        a.on_radio_frame(&hello_frame, -40, 2_001);
        assert!(a.route_table().has(1));

        let outcome = a.send_data(1, 1, alloc::vec![b'h', b'i'], 3_000);
        let Effect::RadioUnicast(mac, frame) = &outcome.effects[0] else {
            panic!("expected unicast to B");
        };
        assert_eq!(*mac, TABLE[1]);

        let delivered = b.on_radio_frame(frame, -40, 3_050);
        assert!(delivered.delivered.is_some());
        let d = delivered.delivered.unwrap();
        assert_eq!(d.path, alloc::vec![1]);
        assert_eq!(d.hop_metrics.len(), 1);
        assert_eq!(d.hop_metrics[0].u, 0);
        assert_eq!(d.hop_metrics[0].v, 1);

        // packet_id != 0 -> an ACK effect accompanies delivery.
        assert!(delivered
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RadioBroadcast(_))));
    }

    #[test]
    fn no_route_originates_rreq() {
        let mut a = core(0);
        let outcome = a.send_data(2, 1, alloc::vec![], 0);
        assert_eq!(outcome.effects.len(), 1);
        assert!(matches!(outcome.effects[0], Effect::RadioBroadcast(_)));
    }

    #[test]
    fn boot_rejects_unprovisioned_mac() {
        let map = AddressMap::new(&TABLE);
        let err = Core::<3>::new(map, config(), [0x99; 6]).unwrap_err();
        assert_eq!(err, CoreError::ConfigError);
    }
}

//! Edge-of-the-wire-format and edge-of-TTL behaviour (spec §8.3).

use fanet_mesh_core::codec::{Frame, FrameType};
use fanet_mesh_core::config::Config;
use fanet_mesh_core::engine::{Core, Effect};
use fanet_mesh_core::forward::{DataBody, DataHeader};
use fanet_mesh_core::{AddressMap, HwAddr};

const TABLE: [HwAddr; 3] = [[0x10; 6], [0x20; 6], [0x30; 6]];

fn node(id: usize) -> Core<'static, 3> {
    let map = AddressMap::new(&TABLE);
    Core::new(map, Config::default(), TABLE[id]).unwrap()
}

/// A frame shorter than the 14-byte header is dropped without panicking
/// and produces no effects.
#[test]
fn undersized_frame_is_dropped_silently() {
    let mut a = node(0);
    let short = [0u8; 13];
    let outcome = a.on_radio_frame(&short, -40, 0);
    assert!(outcome.effects.is_empty());
    assert!(outcome.delivered.is_none());
}

/// A frame whose type byte matches none of the seven known kinds is
/// dropped the same way.
#[test]
fn unknown_frame_type_is_dropped_silently() {
    let mut a = node(0);
    let mut bytes = [0u8; 14];
    bytes[0] = 9;
    let outcome = a.on_radio_frame(&bytes, -40, 0);
    assert!(outcome.effects.is_empty());
    assert!(outcome.delivered.is_none());
}

/// A frame from a hardware address outside `HW_ADDR_TABLE` is dropped:
/// the core never processes traffic from an unprovisioned peer.
#[test]
fn frame_from_unprovisioned_address_is_dropped() {
    let mut a = node(0);
    let frame = Frame::encode_vec(FrameType::Hello, [0xEE; 6], fanet_mesh_core::BROADCAST_HW_ADDR, 10, &[1, 0, 0, 0, 1]);
    let outcome = a.on_radio_frame(&frame, -40, 0);
    assert!(outcome.effects.is_empty());
}

/// `ttl == 1` on an incoming DATA packet is forwarded exactly once more
/// (to `ttl == 0`) rather than being dropped — the final hop is still
/// allowed to deliver.
#[test]
fn ttl_one_forwards_the_final_hop_then_stops() {
    let mut relay = node(1);

    // Give the relay a route to node 2 via a direct HELLO from it.
    let hello = {
        let mut far = node(2);
        match &far.on_tick(2_000, false).effects[..] {
            [Effect::RadioBroadcast(f)] => f.clone(),
            other => panic!("expected a HELLO broadcast, got {other:?}"),
        }
    };
    relay.on_radio_frame(&hello, -40, 2_001);
    assert!(relay.route_table().has(2));

    let header = DataHeader {
        source: 0,
        destination: 2,
        packet_id: 5,
        origin_ms: 0,
    };
    let mut payload = Vec::new();
    let mut header_buf = [0u8; DataHeader::LEN];
    header.encode_into(&mut header_buf);
    payload.extend_from_slice(&header_buf);
    DataBody::default().encode_into(&mut payload);

    let frame = Frame::encode_vec(FrameType::Data, TABLE[0], TABLE[1], 1, &payload);
    let outcome = relay.on_radio_frame(&frame, -40, 2_100);
    match outcome.effects.as_slice() {
        [Effect::RadioUnicast(mac, _)] => assert_eq!(*mac, TABLE[2]),
        other => panic!("ttl==1 must still forward to the final hop, got {other:?}"),
    }
}

/// `ttl == 0` on an incoming DATA packet for a destination that is not
/// this node is dropped rather than forwarded.
#[test]
fn ttl_zero_data_is_dropped() {
    let mut relay = node(1);
    let hello = {
        let mut far = node(2);
        match &far.on_tick(2_000, false).effects[..] {
            [Effect::RadioBroadcast(f)] => f.clone(),
            other => panic!("expected a HELLO broadcast, got {other:?}"),
        }
    };
    relay.on_radio_frame(&hello, -40, 2_001);

    let header = DataHeader {
        source: 0,
        destination: 2,
        packet_id: 5,
        origin_ms: 0,
    };
    let mut payload = Vec::new();
    let mut header_buf = [0u8; DataHeader::LEN];
    header.encode_into(&mut header_buf);
    payload.extend_from_slice(&header_buf);
    DataBody::default().encode_into(&mut payload);

    let frame = Frame::encode_vec(FrameType::Data, TABLE[0], TABLE[1], 0, &payload);
    let outcome = relay.on_radio_frame(&frame, -40, 2_100);
    assert!(outcome.effects.is_empty());
    assert!(outcome.delivered.is_none());
}

/// `packet_id == 0` is the "no ack wanted" sentinel: the packet is still
/// delivered locally, but no ACK is emitted.
#[test]
fn packet_id_zero_delivers_without_ack() {
    let mut dest = node(1);

    let header = DataHeader {
        source: 0,
        destination: 1,
        packet_id: 0,
        origin_ms: 0,
    };
    let mut payload = Vec::new();
    let mut header_buf = [0u8; DataHeader::LEN];
    header.encode_into(&mut header_buf);
    payload.extend_from_slice(&header_buf);
    DataBody::default().encode_into(&mut payload);

    let frame = Frame::encode_vec(FrameType::Data, TABLE[0], TABLE[1], 10, &payload);
    let outcome = dest.on_radio_frame(&frame, -40, 100);
    assert!(outcome.delivered.is_some());
    assert!(outcome.effects.is_empty(), "packet_id 0 must not trigger an ACK");
}

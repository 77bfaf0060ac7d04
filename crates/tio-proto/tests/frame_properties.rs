//! End-to-end framing/packet round trips spanning both transport shapes.

#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use proptest::prelude::*;
use tio_proto::{
    packet::{Payload, PacketType, RawPacket, RpcMethod, RpcRequest, Stream0},
    slip,
};

#[test]
fn tcp_shape_round_trip_through_raw_packet() {
    let payload = Payload::RpcReq(RpcRequest {
        request_id: 7,
        method: RpcMethod::Ordinal(3),
        args: Bytes::from_static(&[1, 2, 3, 4]),
    });
    let encoded_payload = payload.encode();
    let packet = RawPacket::new(
        payload.kind().to_u8(),
        Bytes::from_static(b"\x01"),
        encoded_payload.freeze(),
    )
    .unwrap();

    let wire = packet.encode();
    let (decoded, consumed) = RawPacket::decode(&wire).unwrap();
    assert_eq!(consumed, wire.len());
    assert_eq!(decoded.routing, packet.routing);

    let kind = PacketType::from_u8(decoded.header.payload_type()).unwrap();
    let decoded_payload = Payload::decode(kind, &decoded.payload).unwrap();
    assert_eq!(decoded_payload, payload);
}

#[test]
fn serial_shape_round_trip_through_slip() {
    let payload = Payload::Stream0(Stream0 { sample_number: 42, row: Bytes::from_static(&[9; 8]) });
    let encoded_payload = payload.encode();
    let packet = RawPacket::new(payload.kind().to_u8(), Bytes::new(), encoded_payload.freeze())
        .unwrap();

    let framed = slip::encode(&packet.to_slip_payload());
    let (frame, consumed) = slip::next_frame(&framed).unwrap();
    assert_eq!(consumed, framed.len());

    let unstuffed = slip::decode(frame).unwrap();
    let (decoded, used) = RawPacket::decode(&unstuffed).unwrap();
    assert_eq!(used, unstuffed.len());

    let kind = PacketType::from_u8(decoded.header.payload_type()).unwrap();
    let decoded_payload = Payload::decode(kind, &decoded.payload).unwrap();
    assert_eq!(decoded_payload, payload);
}

#[test]
fn truncated_tcp_frame_is_rejected_without_reading_past_header() {
    let payload = Payload::Heartbeat(Bytes::new());
    let packet = RawPacket::new(payload.kind().to_u8(), Bytes::new(), Bytes::from_static(b"ab"))
        .unwrap();
    let wire = packet.encode();
    let short = &wire[..wire.len() - 1];
    assert!(RawPacket::decode(short).is_err());
}

proptest! {
    #[test]
    fn any_valid_packet_survives_the_tcp_shape(
        routing in proptest::collection::vec(any::<u8>(), 0..=8),
        payload in proptest::collection::vec(any::<u8>(), 0..=400),
    ) {
        let packet = RawPacket::new(PacketType::Log.to_u8(), Bytes::from(routing.clone()), Bytes::from(payload.clone())).unwrap();
        let wire = packet.encode();
        let (decoded, consumed) = RawPacket::decode(&wire).unwrap();
        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(decoded.routing.to_vec(), routing);
        prop_assert_eq!(decoded.payload.to_vec(), payload);
    }

    #[test]
    fn any_valid_packet_survives_the_serial_shape(
        payload in proptest::collection::vec(any::<u8>(), 0..=400),
    ) {
        let packet = RawPacket::new(PacketType::Log.to_u8(), Bytes::new(), Bytes::from(payload.clone())).unwrap();
        let framed = slip::encode(&packet.to_slip_payload());
        let (frame, _) = slip::next_frame(&framed).unwrap();
        let unstuffed = slip::decode(frame).unwrap();
        let (decoded, _) = RawPacket::decode(&unstuffed).unwrap();
        prop_assert_eq!(decoded.payload.to_vec(), payload);
    }
}

//! Frame validation and TCP header decoding through the public API.

mod common;

use std::time::Instant;

use httptap::capture::packet::{frame_is_relevant, TcpPacket};
use httptap::capture::{TCP_FLAG_FIN, TCP_FLAG_PSH};

use common::{peer, tcp_frame};

#[test]
fn test_decode_header_fields() {
    let frame = tcp_frame(5000, 80, 0x0102_0304, 0x0A0B_0C0D, TCP_FLAG_PSH, b"payload");
    let packet = TcpPacket::parse(peer(), &frame, Instant::now()).unwrap();

    assert_eq!(packet.addr, peer());
    assert_eq!(packet.src_port, 5000);
    assert_eq!(packet.dst_port, 80);
    assert_eq!(packet.seq, 0x0102_0304);
    assert_eq!(packet.ack, 0x0A0B_0C0D);
    assert_eq!(packet.data, b"payload");
}

#[test]
fn test_decode_skips_tcp_options() {
    // Data offset of 8 words: 20 header bytes plus 12 option bytes.
    let mut frame = tcp_frame(5000, 80, 1, 2, TCP_FLAG_FIN, b"");
    frame[12] = 0x80;
    frame.extend_from_slice(&[0u8; 12]); // options
    frame.extend_from_slice(b"after-options");

    let packet = TcpPacket::parse(peer(), &frame, Instant::now()).unwrap();
    assert_eq!(packet.data, b"after-options");
    assert!(packet.has_flag(TCP_FLAG_FIN));
}

#[test]
fn test_decode_rejects_payloadless_frames() {
    let frame = tcp_frame(5000, 80, 1, 2, TCP_FLAG_PSH, b"");
    assert!(TcpPacket::parse(peer(), &frame, Instant::now()).is_none());
    assert!(TcpPacket::parse(peer(), &frame[..10], Instant::now()).is_none());
}

#[test]
fn test_port_filter_accepts_either_direction() {
    let to_service = tcp_frame(5000, 80, 1, 2, 0, b"x");
    let from_service = tcp_frame(80, 5000, 1, 2, 0, b"x");
    let unrelated = tcp_frame(5000, 8080, 1, 2, 0, b"x");

    assert!(frame_is_relevant(&to_service, 80));
    assert!(frame_is_relevant(&from_service, 80));
    assert!(!frame_is_relevant(&unrelated, 80));
}

#[test]
fn test_port_filter_requires_payload() {
    let empty = tcp_frame(5000, 80, 1, 2, TCP_FLAG_PSH, b"");
    assert!(!frame_is_relevant(&empty, 80));
    assert!(!frame_is_relevant(&[], 80));
}

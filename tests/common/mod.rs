/// Shared builders for capture integration tests.
///
/// Integration tests run the listener with port `"0"` (raw socket disabled),
/// so "incoming" packets are built with destination port 0 and everything
/// enters through `Listener::inject`.
use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

use httptap::capture::{TcpPacket, TCP_FLAG_PSH};

pub const LISTEN_PORT: u16 = 0;
pub const CLIENT_PORT: u16 = 5000;

pub fn peer() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))
}

/// A client→service segment (destination is the observed port).
pub fn incoming(seq: u32, ack: u32, data: &[u8]) -> TcpPacket {
    TcpPacket {
        addr: peer(),
        src_port: CLIENT_PORT,
        dst_port: LISTEN_PORT,
        seq,
        ack,
        flags: TCP_FLAG_PSH,
        data: data.to_vec(),
        captured_at: Instant::now(),
    }
}

/// A service→client segment.
pub fn outgoing(seq: u32, ack: u32, data: &[u8]) -> TcpPacket {
    TcpPacket {
        addr: peer(),
        src_port: LISTEN_PORT,
        dst_port: CLIENT_PORT,
        seq,
        ack,
        flags: TCP_FLAG_PSH,
        data: data.to_vec(),
        captured_at: Instant::now(),
    }
}

/// A raw TCP frame: 20-byte header followed by the payload. Used by tests
/// that exercise the frame decoder directly.
pub fn tcp_frame(
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&seq.to_be_bytes());
    frame.extend_from_slice(&ack.to_be_bytes());
    frame.push(0x50); // data offset = 5 words
    frame.push(flags);
    frame.extend_from_slice(&1024u16.to_be_bytes()); // window
    frame.extend_from_slice(&[0; 2]); // checksum
    frame.extend_from_slice(&[0; 2]); // urgent ptr
    frame.extend_from_slice(payload);
    frame
}

/// A POST header segment of exactly `total_len` bytes announcing a body of
/// `content_length` bytes, ending with the `Expect: 100-continue` handshake.
pub fn expect_continue_header(total_len: usize, content_length: usize) -> Vec<u8> {
    let head = format!("POST /upload HTTP/1.1\r\nContent-Length: {content_length}\r\n");
    let tail = "Expect: 100-continue\r\n\r\n";
    let pad = "x".repeat(total_len - head.len() - tail.len() - 9);
    let data = format!("{head}X-Pad: {pad}\r\n{tail}").into_bytes();
    assert_eq!(data.len(), total_len);
    data
}

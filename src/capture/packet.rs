//! TCP segment decoding.
//!
//! Frames handed to this module begin at the TCP header; the IP layer has
//! already been stripped by the reader. Parsing is bounds-checked end to end
//! so a truncated or adversarial frame decodes to `None` instead of touching
//! out-of-range bytes.
//!
//! Reference: RFC 793 (TCP header layout).

use std::net::IpAddr;
use std::time::Instant;

pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_PSH: u8 = 0x08;

/// One parsed TCP segment with an owned payload.
///
/// `ack` is mutated by the assembler when the segment turns out to be the
/// body half of an `Expect: 100-continue` request; everything else is fixed
/// at parse time.
#[derive(Debug, Clone)]
pub struct TcpPacket {
    /// Remote peer address the frame was received from.
    pub addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    /// Payload bytes, TCP header already stripped.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub captured_at: Instant,
}

impl TcpPacket {
    /// Decode a TCP frame into a packet. Returns `None` for frames that are
    /// too short, carry a bogus data offset, or have no payload.
    pub fn parse(addr: IpAddr, frame: &[u8], captured_at: Instant) -> Option<Self> {
        if frame.len() < 20 {
            return None;
        }
        let src_port = u16::from_be_bytes([frame[0], frame[1]]);
        let dst_port = u16::from_be_bytes([frame[2], frame[3]]);
        let seq = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let ack = u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]);
        let data_offset = ((frame[12] >> 4) as usize) * 4;
        let flags = frame[13];
        if data_offset < 20 || frame.len() <= data_offset {
            return None;
        }
        Some(Self {
            addr,
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            data: frame[data_offset..].to_vec(),
            captured_at,
        })
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Cheap pre-parse filter used by the read loop: does this frame involve the
/// observed port and carry payload bytes?
///
/// Only the two port fields and the data-offset nibble are read, so frames
/// for other ports are rejected without a full header decode.
pub fn frame_is_relevant(frame: &[u8], port: u16) -> bool {
    if frame.len() < 20 {
        return false;
    }
    let src_port = u16::from_be_bytes([frame[0], frame[1]]);
    let dst_port = u16::from_be_bytes([frame[2], frame[3]]);
    if src_port != port && dst_port != port {
        return false;
    }
    let data_offset = ((frame[12] >> 4) as usize) * 4;
    frame.len() > data_offset
}

//! An HTTP message under reconstruction from TCP segments.

use std::time::Instant;

use crate::capture::packet::{TcpPacket, TCP_FLAG_FIN, TCP_FLAG_PSH};
use crate::http;

/// One logical HTTP message: the segments observed for a single
/// `(peer, dst_port, ack)` identity, in arrival order.
///
/// For an incoming request, `response_ack` predicts the acknowledgement
/// number the peer's response will carry. For an outgoing response,
/// `request_ack`/`request_start` identify the request it answers once the
/// pairing has been resolved; `request_ack == 0` means unpaired.
#[derive(Debug)]
pub struct TcpMessage {
    pub id: String,
    /// Sequence number of the first segment, used to recognise a
    /// continuation body that arrived before its header half.
    pub seq: u32,
    /// Canonical acknowledgement number, the correlation key.
    pub ack: u32,
    pub is_incoming: bool,
    /// Capture time of the first segment.
    pub start: Instant,
    pub response_ack: u32,
    pub request_ack: u32,
    pub request_start: Option<Instant>,
    packets: Vec<TcpPacket>,
    body_size: usize,
}

impl TcpMessage {
    pub fn new(id: String, seq: u32, ack: u32, is_incoming: bool, start: Instant) -> Self {
        Self {
            id,
            seq,
            ack,
            is_incoming,
            start,
            response_ack: 0,
            request_ack: 0,
            request_start: None,
            packets: Vec::new(),
            body_size: 0,
        }
    }

    /// Append a segment. The message takes ownership of the payload buffer.
    /// A merged-in segment may predate the message; `start` tracks the
    /// earliest capture time.
    pub fn add_packet(&mut self, packet: TcpPacket) {
        if packet.captured_at < self.start {
            self.start = packet.captured_at;
        }
        self.body_size += packet.data.len();
        self.packets.push(packet);
    }

    /// Total payload bytes across all segments appended so far.
    pub fn body_size(&self) -> usize {
        self.body_size
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn packets(&self) -> &[TcpPacket] {
        &self.packets
    }

    /// Remote peer address, taken from the first segment.
    pub fn peer(&self) -> Option<std::net::IpAddr> {
        self.packets.first().map(|p| p.addr)
    }

    /// Payload bytes concatenated in arrival order.
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body_size);
        for packet in &self.packets {
            out.extend_from_slice(&packet.data);
        }
        out
    }

    /// The HTTP request line or status line, when the payload starts with one.
    pub fn first_line(&self) -> Option<String> {
        let payload = self.payload();
        if !http::starts_like_http(&payload) {
            return None;
        }
        let line = payload.split(|&b| b == b'\r').next()?;
        Some(String::from_utf8_lossy(line).into_owned())
    }

    /// Whether the segment series is believed complete.
    ///
    /// An outgoing message is never finished until paired with its request:
    /// dispatching earlier would either drop it as an orphan or skip the
    /// back-fill performed when the request dispatches. Beyond that, a
    /// message must have seen FIN or PSH and its payload must form a
    /// complete HTTP message. Payloads that never look like HTTP (e.g. a
    /// body segment that arrived before its header) are left to the expiry
    /// sweep.
    pub fn is_finished(&self) -> bool {
        if !self.is_incoming && self.request_ack == 0 {
            return false;
        }
        if !self
            .packets
            .iter()
            .any(|p| p.has_flag(TCP_FLAG_FIN) || p.has_flag(TCP_FLAG_PSH))
        {
            return false;
        }
        http::is_complete(&self.payload())
    }

    /// Consume the message, yielding its segments for a merge into another
    /// message.
    pub fn into_packets(self) -> Vec<TcpPacket> {
        self.packets
    }
}

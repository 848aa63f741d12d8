//! Message assembly: grouping TCP segments into HTTP messages and pairing
//! requests with responses.
//!
//! All reassembly state lives in five maps owned by a single task; packets
//! and expiry ticks are the only events that mutate them, so no locking is
//! needed. Messages are always re-resolved by id through `messages` rather
//! than held by reference, which keeps removal from that map sufficient to
//! release a message.
//!
//! The correlation trick: for a request observed at acknowledgement `A`, the
//! server's response will carry acknowledgement `A's seq + request bytes`.
//! Registering that predicted number in `resp_aliases` pairs the two
//! independent flow directions without per-connection state.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::capture::message::TcpMessage;
use crate::capture::packet::TcpPacket;
use crate::http;

/// Identity of a request awaiting its response, stored under the
/// acknowledgement number the response will carry.
#[derive(Debug, Clone, Copy)]
struct RequestOrigin {
    start: Instant,
    ack: u32,
}

pub(crate) struct Assembler {
    port: u16,
    message_expire: Duration,

    /// In-progress messages by id.
    messages: HashMap<String, TcpMessage>,
    /// Alias ack → canonical ack. An `Expect: 100-continue` request arrives
    /// as two segments with different acks; the body's ack is aliased to the
    /// header's.
    ack_aliases: HashMap<u32, u32>,
    /// Expected seq of a continuation body → the ack of its header half.
    seq_with_data: HashMap<u32, u32>,
    /// Predicted response ack → originating request.
    resp_aliases: HashMap<u32, RequestOrigin>,
    /// Ack → message id, for responses seen before their request finished.
    resp_without_req: HashMap<u32, String>,

    output: mpsc::Sender<TcpMessage>,
}

fn message_id(addr: &IpAddr, dst_port: u16, ack: u32) -> String {
    format!("{addr}:{dst_port}:{ack}")
}

impl Assembler {
    pub(crate) fn new(port: u16, message_expire: Duration, output: mpsc::Sender<TcpMessage>) -> Self {
        Self {
            port,
            message_expire,
            messages: HashMap::new(),
            ack_aliases: HashMap::new(),
            seq_with_data: HashMap::new(),
            resp_aliases: HashMap::new(),
            resp_without_req: HashMap::new(),
            output,
        }
    }

    /// Event loop: packets, expiry ticks, shutdown. Runs until the shutdown
    /// signal fires or the packet channel closes.
    pub(crate) async fn run(
        mut self,
        mut packets: mpsc::Receiver<TcpPacket>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let period = self.message_expire / 2;
        let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                maybe_packet = packets.recv() => {
                    match maybe_packet {
                        Some(packet) => self.ingest(packet).await,
                        None => break,
                    }
                }
                _ = sweep.tick() => self.sweep_expired().await,
            }
        }
    }

    /// Fold one packet into the reassembly state.
    async fn ingest(&mut self, mut packet: TcpPacket) {
        let is_incoming = packet.dst_port == self.port;

        // This seq was announced by an Expect: 100-continue header: the
        // packet is the body half, captured under its own ack. Alias that
        // ack to the header's so both halves share one message.
        if let Some(parent_ack) = self.seq_with_data.remove(&packet.seq) {
            self.ack_aliases.insert(packet.ack, parent_ack);
            packet.ack = parent_ack;
        }

        if let Some(&canonical) = self.ack_aliases.get(&packet.ack) {
            packet.ack = canonical;
        }

        let request_origin = if is_incoming {
            None
        } else {
            self.resp_aliases.get(&packet.ack).copied()
        };

        let id = message_id(&packet.addr, packet.dst_port, packet.ack);
        if !self.messages.contains_key(&id) {
            let mut message =
                TcpMessage::new(id.clone(), packet.seq, packet.ack, is_incoming, packet.captured_at);
            if !is_incoming {
                match request_origin {
                    Some(origin) => {
                        message.request_ack = origin.ack;
                        message.request_start = Some(origin.start);
                    }
                    None => {
                        self.resp_without_req.insert(packet.ack, id.clone());
                    }
                }
            }
            self.messages.insert(id.clone(), message);
        }

        if http::has_expect_continue(&packet.data) {
            let next_seq = packet.seq.wrapping_add(packet.data.len() as u32);
            self.seq_with_data.insert(next_seq, packet.ack);
            self.absorb_continuations(next_seq, packet.ack, &id);
            http::strip_expect_continue(&mut packet.data);
        }

        if is_incoming {
            let Some(message) = self.messages.get(&id) else {
                tracing::warn!(id, "message vanished during ingest; dropping packet");
                return;
            };
            // A later segment moves the predicted response ack; retire the
            // entry registered for the previous one.
            if message.packet_count() > 0 {
                let stale = message.response_ack;
                self.resp_aliases.remove(&stale);
            }
            let response_ack = packet
                .seq
                .wrapping_add(message.body_size() as u32)
                .wrapping_add(packet.data.len() as u32);
            let origin = RequestOrigin {
                start: message.start,
                ack: message.ack,
            };
            self.resp_aliases.insert(response_ack, origin);
            if let Some(message) = self.messages.get_mut(&id) {
                message.response_ack = response_ack;
            }
        }

        let Some(message) = self.messages.get_mut(&id) else {
            tracing::warn!(id, "message vanished during ingest; dropping packet");
            return;
        };
        message.add_packet(packet);

        if message.is_finished() {
            self.dispatch(&id).await;
        }
    }

    /// A header half announced that its body will start at `next_seq`. Any
    /// message already keyed by that seq is the body arrived out of order:
    /// alias its ack, move its segments into the current message and delete
    /// it, along with the correlation entries registered under its identity.
    fn absorb_continuations(&mut self, next_seq: u32, parent_ack: u32, current_id: &str) {
        let continuation_ids: Vec<String> = self
            .messages
            .values()
            .filter(|m| m.seq == next_seq)
            .map(|m| m.id.clone())
            .collect();

        for continuation_id in continuation_ids {
            let Some(continuation) = self.messages.remove(&continuation_id) else {
                continue;
            };
            self.ack_aliases.insert(continuation.ack, parent_ack);
            self.resp_aliases.remove(&continuation.response_ack);
            if self.resp_without_req.get(&continuation.ack) == Some(&continuation_id) {
                self.resp_without_req.remove(&continuation.ack);
            }

            tracing::debug!(
                from = continuation_id,
                into = current_id,
                segments = continuation.packet_count(),
                "merging out-of-order continuation"
            );
            let segments = continuation.into_packets();
            if let Some(current) = self.messages.get_mut(current_id) {
                for segment in segments {
                    current.add_packet(segment);
                }
            }
        }
    }

    /// Remove a message from the reassembly state and hand it downstream.
    ///
    /// Dispatching a request back-fills the pairing onto a response that was
    /// observed first; if that response is thereby completed it is queued on
    /// a local worklist rather than dispatched recursively. Responses that
    /// never found their request are dropped.
    async fn dispatch(&mut self, id: &str) {
        let mut worklist = vec![id.to_string()];

        while let Some(id) = worklist.pop() {
            let Some(message) = self.messages.remove(&id) else {
                continue;
            };
            self.ack_aliases.remove(&message.ack);

            if message.is_incoming {
                if let Some(response_id) = self.resp_without_req.get(&message.response_ack).cloned()
                {
                    if let Some(response) = self.messages.get_mut(&response_id) {
                        if response.request_ack == 0 {
                            response.request_ack = message.ack;
                            response.request_start = Some(message.start);
                            if response.is_finished() {
                                worklist.push(response_id);
                            }
                        }
                    }
                }
            } else {
                self.resp_aliases.remove(&message.ack);
                self.resp_without_req.remove(&message.ack);
                if message.request_ack == 0 {
                    tracing::debug!(ack = message.ack, "dropping response with no matching request");
                    continue;
                }
            }

            tracing::debug!(
                id,
                incoming = message.is_incoming,
                segments = message.packet_count(),
                bytes = message.body_size(),
                "dispatching message"
            );
            if self.output.send(message).await.is_err() {
                tracing::warn!("message channel closed; discarding assembled message");
            }
        }
    }

    /// Flush messages older than `message_expire`, complete or not. Partial
    /// capture beats silent loss.
    async fn sweep_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .messages
            .values()
            .filter(|m| now.duration_since(m.start) >= self.message_expire)
            .map(|m| m.id.clone())
            .collect();

        for id in &expired {
            tracing::debug!(id, "expiring partial message");
            self.dispatch(id).await;
        }
    }
}

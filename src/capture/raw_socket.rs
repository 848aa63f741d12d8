//! Raw socket acquisition and the blocking read loop.
//!
//! A raw IPv4/TCP socket sees every TCP datagram the host receives,
//! regardless of port, so the loop filters frames itself before spending a
//! full header decode on them. On Linux the kernel delivers the IP header
//! with each datagram; it is stripped here so everything downstream starts
//! at the TCP header.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::mpsc;

use crate::capture::packet::{self, TcpPacket};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How often the read loop wakes to check the stop flag when no traffic
/// arrives.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) struct RawSocketReader {
    socket: UdpSocket,
    port: u16,
    packets: mpsc::Sender<TcpPacket>,
    stop: Arc<AtomicBool>,
}

impl RawSocketReader {
    /// Acquire a raw IPv4/TCP socket bound to `addr`. Fails when the process
    /// lacks the privilege raw sockets require; that failure is fatal to the
    /// listener.
    pub(crate) fn open(
        addr: Ipv4Addr,
        port: u16,
        packets: mpsc::Sender<TcpPacket>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
            .context("failed to open raw socket (requires elevated privileges)")?;
        socket
            .bind(&SocketAddr::new(addr.into(), 0).into())
            .with_context(|| format!("failed to bind raw socket to {addr}"))?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .context("failed to configure raw socket read timeout")?;
        Ok(Self {
            socket: socket.into(),
            port,
            packets,
            stop,
        })
    }

    /// Move the blocking read loop onto the blocking thread pool.
    pub(crate) fn spawn(self) {
        tokio::task::spawn_blocking(move || self.read_loop());
    }

    fn read_loop(self) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            if self.stop.load(Ordering::Relaxed) {
                tracing::debug!("raw socket reader stopping");
                return;
            }

            let (n, peer) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) if is_closed_socket(&e) => {
                    tracing::debug!(error = %e, "raw socket closed; reader exiting");
                    return;
                }
                Err(e) => {
                    // Transient OS errors must not kill capture.
                    tracing::warn!(error = %e, "raw socket read failed; retrying");
                    continue;
                }
            };

            let captured_at = Instant::now();
            let Some(frame) = strip_ip_header(&buf[..n]) else {
                continue;
            };
            if !packet::frame_is_relevant(frame, self.port) {
                continue;
            }
            // The shared buffer is reused next iteration; parse copies the
            // payload into an owned buffer.
            let Some(tcp_packet) = TcpPacket::parse(peer.ip(), frame, captured_at) else {
                continue;
            };
            if self.packets.blocking_send(tcp_packet).is_err() {
                tracing::debug!("packet channel closed; reader exiting");
                return;
            }
        }
    }
}

/// Slice off the IPv4 header, leaving the frame to start at the TCP header.
fn strip_ip_header(datagram: &[u8]) -> Option<&[u8]> {
    let first = *datagram.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let header_len = ((first & 0x0F) as usize) * 4;
    if header_len < 20 || datagram.len() <= header_len {
        return None;
    }
    Some(&datagram[header_len..])
}

fn is_closed_socket(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

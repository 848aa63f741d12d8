//! Passive capture pipeline.
//!
//! ## Architecture
//!
//! ```text
//! raw socket → RawSocketReader → packet queue → Assembler → message queue → receive()
//! ```
//!
//! Two long-running tasks: the reader blocks in the OS read and owns only
//! its scratch buffer; the assembler owns every piece of reassembly state
//! and selects over {packet, expiry tick, shutdown}. Both queues are
//! bounded, so a slow consumer stalls ingest instead of growing memory;
//! drops under pressure already happen silently at the OS raw-socket buffer.

pub mod message;
pub mod packet;

mod assembler;
mod raw_socket;

pub use message::TcpMessage;
pub use packet::{TcpPacket, TCP_FLAG_FIN, TCP_FLAG_PSH};

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, mpsc};

use assembler::Assembler;
use raw_socket::RawSocketReader;

/// Applied when the caller passes a zero expiry.
pub const DEFAULT_MESSAGE_EXPIRE: Duration = Duration::from_millis(2000);

/// Capacity of the packet and message queues.
const CHANNEL_CAPACITY: usize = 10_000;

/// Captures traffic for one TCP port and hands out assembled HTTP messages.
///
/// Must be constructed inside a tokio runtime; the capture tasks are spawned
/// from the constructor.
pub struct Listener {
    packets_tx: mpsc::Sender<TcpPacket>,
    messages_rx: mpsc::Receiver<TcpMessage>,
    shutdown_tx: broadcast::Sender<()>,
    stop: Arc<AtomicBool>,
}

impl Listener {
    /// Start capturing.
    ///
    /// - `addr`: dotted-quad IPv4 bind address for the raw socket.
    /// - `port`: decimal TCP port to observe. `"0"` disables the raw socket
    ///   entirely; packets then enter only through [`Listener::inject`].
    /// - `expire`: how long a partial message may linger before the expiry
    ///   sweep flushes it. Zero selects [`DEFAULT_MESSAGE_EXPIRE`].
    pub fn new(addr: &str, port: &str, expire: Duration) -> Result<Self> {
        let addr: Ipv4Addr = addr
            .parse()
            .with_context(|| format!("invalid IPv4 bind address: {addr:?}"))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port: {port:?}"))?;
        let expire = if expire.is_zero() {
            DEFAULT_MESSAGE_EXPIRE
        } else {
            expire
        };

        let (packets_tx, packets_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (messages_tx, messages_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stop = Arc::new(AtomicBool::new(false));

        tokio::spawn(Assembler::new(port, expire, messages_tx).run(packets_rx, shutdown_rx));

        if port != 0 {
            let reader = RawSocketReader::open(addr, port, packets_tx.clone(), stop.clone())?;
            reader.spawn();
            tracing::info!(%addr, port, expire_ms = expire.as_millis() as u64, "capture started");
        } else {
            tracing::info!("raw socket disabled; accepting injected packets only");
        }

        Ok(Self {
            packets_tx,
            messages_rx,
            shutdown_tx,
            stop,
        })
    }

    /// Dequeue one assembled message. Returns `None` once the engine has
    /// shut down and the queue is drained.
    pub async fn receive(&mut self) -> Option<TcpMessage> {
        self.messages_rx.recv().await
    }

    /// Feed a parsed packet straight into the assembly queue. This is the
    /// ingest path when the raw socket is disabled (port `"0"`).
    pub async fn inject(&self, packet: TcpPacket) -> Result<()> {
        self.packets_tx
            .send(packet)
            .await
            .map_err(|_| anyhow!("capture engine has shut down"))
    }

    /// Signal shutdown: the reader exits its read loop, the assembler stops
    /// consuming events. Idempotent. In-flight partial messages are not
    /// flushed.
    pub fn close(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());
    }
}

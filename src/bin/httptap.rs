use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use httptap::capture::{Listener, TcpMessage};
use httptap::observability;

#[derive(Parser, Debug)]
#[command(name = "httptap", version, about = "httptap – passive HTTP traffic capture over raw sockets")]
struct Cli {
    /// IPv4 address to bind the raw socket to
    #[arg(long, default_value = "0.0.0.0")]
    addr: String,

    /// TCP port to observe
    #[arg(long)]
    port: String,

    /// Partial-message expiry in milliseconds (0 = default of 2000)
    #[arg(long, default_value_t = 0)]
    expire_ms: u64,

    /// Emit one JSON record per captured message instead of plain text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Use JSON logs
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

/// One captured message, flattened for export.
#[derive(Serialize)]
struct MessageRecord {
    direction: &'static str,
    peer: Option<String>,
    dst_port: u16,
    ack: u32,
    segments: usize,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_line: Option<String>,
    /// Request-to-response latency; present on paired responses only.
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<f64>,
}

impl MessageRecord {
    fn from_message(message: &TcpMessage) -> Self {
        let dst_port = message
            .packets()
            .first()
            .map(|p| p.dst_port)
            .unwrap_or_default();
        let latency_ms = message
            .request_start
            .map(|start| message.start.duration_since(start).as_secs_f64() * 1000.0);
        Self {
            direction: if message.is_incoming { "request" } else { "response" },
            peer: message.peer().map(|ip| ip.to_string()),
            dst_port,
            ack: message.ack,
            segments: message.packet_count(),
            bytes: message.body_size(),
            first_line: message.first_line(),
            latency_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(cli.log_json);

    let mut listener = Listener::new(&cli.addr, &cli.port, Duration::from_millis(cli.expire_ms))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received; shutting down");
                listener.close();
                break;
            }
            maybe_message = listener.receive() => {
                let Some(message) = maybe_message else {
                    break;
                };
                let record = MessageRecord::from_message(&message);
                if cli.json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    print_plain(&record);
                }
            }
        }
    }

    Ok(())
}

fn print_plain(record: &MessageRecord) {
    let peer = record.peer.as_deref().unwrap_or("?");
    let line = record.first_line.as_deref().unwrap_or("<non-http payload>");
    match record.latency_ms {
        Some(latency) => println!(
            "{:8} {} {} ({} segments, {} bytes, {:.1} ms)",
            record.direction, peer, line, record.segments, record.bytes, latency
        ),
        None => println!(
            "{:8} {} {} ({} segments, {} bytes)",
            record.direction, peer, line, record.segments, record.bytes
        ),
    }
}

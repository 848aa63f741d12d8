//! httptap: passive HTTP traffic capture using RAW sockets.
//!
//! Raw sockets operate at the IP level, so they can observe traffic on any
//! TCP port without owning the port. Ports, ordering and message framing are
//! TCP features, which means this crate carries its own small TCP layer:
//! packets are decoded by `capture::packet` and flow bookkeeping lives in
//! `capture::assembler`.
//!
//! ## Architecture
//!
//! ```text
//! raw socket → RawSocketReader → (bounded queue) → Assembler → (bounded queue) → consumer
//! ```
//!
//! - **RawSocketReader:** blocking read loop over a raw IPv4/TCP socket
//! - **packet:** TCP header decode into owned [`capture::TcpPacket`] values
//! - **Assembler:** groups packets into HTTP messages and pairs each request
//!   with its response by acknowledgement number
//! - **Listener:** public facade (construction, `receive`, `close`)
//!
//! Reference: RFC 793 (TCP), RFC 9110 (HTTP semantics).

pub mod capture;
pub mod http;
pub mod observability;

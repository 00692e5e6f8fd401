//! A partial, from-scratch implementation of the Secure Reliable Transport (SRT) protocol: a
//! UDP-based reliable, ordered, handshake-driven transport with connection multiplexing.
//!
//! The engine is split the way the protocol itself is: a stateless handshake ([`srt::handshake`])
//! validated and driven by a [`srt::Listener`] that demultiplexes a shared [`srt::PacketEndpoint`]
//! across many [`srt::Connection`]s, each holding its own send/receive sequence state and
//! reassembly queue. Encryption, congestion control tuning, and live retransmission (NAK-driven
//! resend) are out of scope; see `SPEC_FULL.md` for the full boundary.
pub mod config;
pub mod error;
pub mod metrics;
pub mod proto;
pub mod srt;

pub use config::Config;
pub use error::{Error, Result};
pub use srt::{Connection, ConnectionId, Listener, PacketEndpoint, SocketId, UdpEndpoint};

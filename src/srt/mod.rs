//! The SRT protocol engine: handshake state machine, per-connection demultiplexer, wire codec,
//! and receive reassembly.
//!
//! Module layout mirrors the shape of the protocol itself rather than a generic "transport"
//! abstraction: [`packet`]/[`handshake_packet`]/[`header`] are the wire codec, [`serial`]/
//! [`sequence`]/[`message`] are the wraparound-arithmetic primitives the codec and reassembly
//! queue share, [`cookie`] and [`handshake`] are the stateless validation/construction logic the
//! [`listener`] drives, and [`connection`]/[`reassembly`] are the per-session engine.
pub mod connection;
pub mod control;
pub mod cookie;
pub mod endpoint;
pub mod handshake;
pub mod handshake_packet;
pub mod header;
pub mod listener;
pub mod message;
pub mod packet;
pub mod reassembly;
pub mod sequence;
pub mod serial;

pub use connection::{Connection, ConnectionId, SocketId};
pub use endpoint::{PacketEndpoint, UdpEndpoint};
pub use listener::Listener;

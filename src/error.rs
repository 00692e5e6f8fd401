//! Error taxonomy for the wire codec and the protocol engine.
use std::io;

/// Errors surfaced by the wire codec and the handshake/connection/listener engine.
///
/// Every variant here corresponds to one of the error kinds named in the error-handling
/// design: parse/validation failures are recoverable and the caller decides whether to log
/// and drop a packet or surface the error to an application.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed packet")]
    MalformedPacket,
    #[error("unsupported encryption field {0}")]
    BadEncryption(u16),
    #[error("cookie mismatch")]
    BadCookie,
    #[error("bad handshake: {0}")]
    BadHandshake(&'static str),
    #[error("bad extension")]
    BadExtension,
    #[error("unknown connection")]
    UnknownConnection,
    #[error("accept queue overflow")]
    AcceptOverflow,
    #[error("buffer too short")]
    ShortBuffer,
    #[error("connection closed")]
    Closed,
    #[error("end of stream")]
    Eof,
    #[error("write failed: {0}")]
    WriteFailed(io::Error),
    #[error("read failed: {0}")]
    ReadFailed(io::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

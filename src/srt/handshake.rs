//! Pure handshake logic: validating an incoming Induction/Conclusion packet and constructing
//! the matching response, for both roles a [`super::listener::Listener`] can play.
//!
//! Nothing here touches a socket. The listener's receive loop owns all the stateful parts
//! (the cookie seed, the demux tables, deciding whether an inbound `(5, Conclusion)` packet is
//! a server-side accept or a client-side dial response) and calls into these functions to
//! validate wire content and build replies.
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

use super::cookie::calc_cookie;
use super::handshake_packet::{
    Extension, HandshakePacket, HandshakeType, EXT_FLAG_CONFIG, EXT_FLAG_HSREQ, EXT_FLAG_KMREQ, MAGIC,
};
use super::header::Header;
use super::sequence::Sequence;

/// SRT core version advertised in HS-request/HS-response extensions (1.4.0).
pub const LIBRARY_VERSION: u32 = (1 << 16) | (4 << 8);

/// Extension-field bits this engine sets on its own Induction and Conclusion requests/responses.
const INDUCTION_REQUEST_EXT_FIELD: u16 = EXT_FLAG_KMREQ;
const CONCLUSION_EXT_FIELD: u16 = EXT_FLAG_HSREQ | EXT_FLAG_CONFIG;

fn check_encryption(p: &HandshakePacket, config: &Config) -> Result<()> {
    if p.encryption_field != config.encryption {
        return Err(Error::BadEncryption(p.encryption_field));
    }
    Ok(())
}

/// Reverses a 4-byte ASCII tag for the wire, matching the reference library's convention of
/// sending the congestion-control name backwards (`"file"` becomes `"elif"`).
fn reversed_tag(name: &str) -> [u8; 4] {
    let bytes = name.as_bytes();
    let mut tag = [0u8; 4];
    for (i, b) in bytes.iter().take(4).enumerate() {
        tag[3 - i] = *b;
    }
    tag
}

fn congestion_extension(config: &Config) -> Extension {
    Extension::congestion(&reversed_tag(&config.congestion))
}

// --- Server-accept role -----------------------------------------------------------------

/// Validates a client's Induction request (message 1 in the four-way handshake): version 4,
/// extension-field carrying a KM-request, and a zero cookie (the client cannot know the cookie
/// before the server mints one in the Induction response).
pub fn validate_induction(p: &HandshakePacket, config: &Config) -> Result<()> {
    if p.handshake_type != HandshakeType::Induction {
        return Err(Error::BadHandshake("expected induction"));
    }
    if p.version != 4 {
        return Err(Error::BadHandshake("unsupported version"));
    }
    if p.extension_field != INDUCTION_REQUEST_EXT_FIELD {
        return Err(Error::BadExtension);
    }
    if p.syn_cookie != 0 {
        return Err(Error::BadHandshake("cookie must be zero on induction"));
    }
    check_encryption(p, config)
}

/// Builds the server's Induction response (message 2): always version 5, the SRT magic in the
/// extension field, and a cookie binding the response to the client's address and the current
/// time bucket.
///
/// The induction response does not yet carry a server-allocated socket id — the reference
/// engine only allocates one once the Conclusion arrives — so `srt_socket_id` is sent as `0`.
pub fn induction_response(
    request: &HandshakePacket,
    peer_addr: SocketAddr,
    now: Duration,
    seed1: u64,
    seed2: u64,
    config: &Config,
) -> HandshakePacket {
    let cookie = calc_cookie(peer_addr, now, seed1, seed2);

    HandshakePacket {
        header: Header {
            oct0: 0,
            oct1: 0,
            timestamp: 0,
            destination_socket_id: request.srt_socket_id,
        },
        version: 5,
        encryption_field: config.encryption,
        extension_field: MAGIC,
        initial_sequence_number: request.initial_sequence_number,
        mtu: request.mtu,
        max_flow_window: request.max_flow_window,
        handshake_type: HandshakeType::Induction,
        srt_socket_id: 0,
        syn_cookie: cookie,
        peer_ip_address: 0,
        extensions: Vec::new(),
    }
}

/// Validates a client's Conclusion request (message 3): version, encryption, and the cookie
/// round trip. The cookie is recomputed rather than stored, so the server keeps no per-peer
/// state between messages 2 and 3.
pub fn validate_conclusion(
    p: &HandshakePacket,
    peer_addr: SocketAddr,
    now: Duration,
    seed1: u64,
    seed2: u64,
    config: &Config,
) -> Result<()> {
    if p.handshake_type != HandshakeType::Conclusion {
        return Err(Error::BadHandshake("expected conclusion"));
    }
    if p.version != 5 {
        return Err(Error::BadHandshake("unsupported version"));
    }
    check_encryption(p, config)?;

    let expected = calc_cookie(peer_addr, now, seed1, seed2);
    if p.syn_cookie != expected {
        return Err(Error::BadCookie);
    }

    Ok(())
}

/// Builds the server's Conclusion response (message 4), completing the accept: an HS-response
/// extension echoing the negotiated library version, and a congestion-control tag.
pub fn conclusion_response(
    request: &HandshakePacket,
    local_initial_seq: Sequence,
    server_socket_id: u32,
    config: &Config,
) -> HandshakePacket {
    HandshakePacket {
        header: Header {
            oct0: 0,
            oct1: 0,
            timestamp: 0,
            destination_socket_id: request.srt_socket_id,
        },
        version: 5,
        encryption_field: config.encryption,
        extension_field: CONCLUSION_EXT_FIELD,
        initial_sequence_number: local_initial_seq,
        mtu: config.mtu,
        max_flow_window: config.flow_window,
        handshake_type: HandshakeType::Conclusion,
        srt_socket_id: server_socket_id,
        syn_cookie: request.syn_cookie,
        peer_ip_address: 0,
        extensions: vec![
            Extension::hs_response(LIBRARY_VERSION, 0),
            congestion_extension(config),
        ],
    }
}

// --- Client-dial role --------------------------------------------------------------------

/// Builds the client's Induction request (message 1): version 4, no cookie yet.
pub fn induction_request(local_socket_id: u32, initial_seq: Sequence, config: &Config) -> HandshakePacket {
    HandshakePacket {
        header: Header {
            oct0: 0,
            oct1: 0,
            timestamp: 0,
            destination_socket_id: 0,
        },
        version: 4,
        encryption_field: config.encryption,
        extension_field: INDUCTION_REQUEST_EXT_FIELD,
        initial_sequence_number: initial_seq,
        mtu: config.mtu,
        max_flow_window: config.flow_window,
        handshake_type: HandshakeType::Induction,
        srt_socket_id: local_socket_id,
        syn_cookie: 0,
        peer_ip_address: 0,
        extensions: Vec::new(),
    }
}

/// Validates the server's Induction response (message 2).
pub fn validate_induction_response(p: &HandshakePacket) -> Result<()> {
    if p.handshake_type != HandshakeType::Induction {
        return Err(Error::BadHandshake("expected induction response"));
    }
    if p.extension_field != MAGIC {
        return Err(Error::BadHandshake("missing SRT magic"));
    }
    Ok(())
}

/// Builds the client's Conclusion request (message 3), echoing the cookie the server minted and
/// carrying this core's own HS-request and congestion extensions.
pub fn conclusion_request(
    induction_response: &HandshakePacket,
    local_socket_id: u32,
    initial_seq: Sequence,
    config: &Config,
) -> HandshakePacket {
    HandshakePacket {
        header: Header {
            oct0: 0,
            oct1: 0,
            timestamp: 0,
            destination_socket_id: 0,
        },
        version: 5,
        encryption_field: config.encryption,
        extension_field: CONCLUSION_EXT_FIELD,
        initial_sequence_number: initial_seq,
        mtu: config.mtu,
        max_flow_window: config.flow_window,
        handshake_type: HandshakeType::Conclusion,
        srt_socket_id: local_socket_id,
        syn_cookie: induction_response.syn_cookie,
        peer_ip_address: 0,
        extensions: vec![
            Extension::hs_request(LIBRARY_VERSION, 0),
            congestion_extension(config),
        ],
    }
}

/// Validates the server's Conclusion response (message 4), resolving a pending dial.
pub fn validate_conclusion_response(p: &HandshakePacket) -> Result<()> {
    if p.handshake_type != HandshakeType::Conclusion {
        return Err(Error::BadHandshake("expected conclusion response"));
    }
    if p.version != 5 {
        return Err(Error::BadHandshake("unsupported version"));
    }
    Ok(())
}

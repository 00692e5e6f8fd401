//! Wire-compatibility check against a captured real handshake exchange, and a full end-to-end
//! accept/connect/read/write/close run over real loopback UDP sockets.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use srt_engine::config::Config;
use srt_engine::srt::handshake_packet::{HandshakeType, EXT_TYPE_CONGESTION, EXT_TYPE_HSREQ};
use srt_engine::srt::header::PacketType;
use srt_engine::srt::packet::classify;
use srt_engine::Listener;

// Captured client Induction (message 1): library version 4, socket id 0x209e7d6d, ISN
// 0x26884789, MTU 1500, flow window 0x2000.
const INDUCTION: &[u8] = &[
    0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x63, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0x26, 0x88, 0x47, 0x89, 0x00, 0x00, 0x05, 0xdc,
    0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x01, 0x20, 0x9e, 0x7d, 0x6d, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x7f, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

// Captured client Conclusion (message 3): same socket id and ISN, echoing a cookie, carrying an
// HS-request extension (12-byte body) and a congestion extension ("elif" = "file" reversed).
const CONCLUSION: &[u8] = &[
    0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x05, 0x26, 0x88, 0x47, 0x89, 0x00, 0x00, 0x05, 0xdc,
    0x00, 0x00, 0x20, 0x00, 0xff, 0xff, 0xff, 0xff, 0x20, 0x9e, 0x7d, 0x6d, 0x9d, 0x89, 0x51, 0x86,
    0x01, 0x00, 0x00, 0x7f, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x01, 0x00, 0x03, 0x00, 0x01, 0x04, 0x03, 0x00, 0x00, 0x00, 0xe4, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x06, 0x00, 0x01, 0x65, 0x6c, 0x69, 0x66,
];

#[test]
fn captured_induction_decodes_as_expected() {
    use srt_engine::srt::handshake_packet::HandshakePacket;

    assert_eq!(classify(INDUCTION).unwrap(), PacketType::Control);

    let p = HandshakePacket::decode(INDUCTION).unwrap();
    assert_eq!(p.version, 4);
    assert_eq!(p.handshake_type, HandshakeType::Induction);
    assert_eq!(p.srt_socket_id, 0x209e_7d6d);
    assert_eq!(p.initial_sequence_number.get(), 0x2688_4789);
    assert_eq!(p.mtu, 1500);
    assert_eq!(p.max_flow_window, 0x2000);
    assert_eq!(p.syn_cookie, 0);
}

#[test]
fn captured_conclusion_decodes_as_expected() {
    use srt_engine::srt::handshake_packet::HandshakePacket;

    let p = HandshakePacket::decode(CONCLUSION).unwrap();
    assert_eq!(p.version, 5);
    assert_eq!(p.handshake_type, HandshakeType::Conclusion);
    assert_eq!(p.srt_socket_id, 0x209e_7d6d);
    assert_eq!(p.syn_cookie, 0x9d89_5186);
    assert_eq!(p.extension_field, 5);

    let hsreq = p.extension(EXT_TYPE_HSREQ).unwrap();
    assert_eq!(hsreq.payload.len(), 12);
    assert_eq!(&hsreq.payload[0..4], &[0x00, 0x01, 0x04, 0x03]);

    let congestion = p.extension(EXT_TYPE_CONGESTION).unwrap();
    assert_eq!(&congestion.payload[..], b"elif");
}

#[tokio::test]
async fn full_accept_connect_read_write_close_over_loopback() {
    let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);

    let server = Listener::bind(SocketAddr::new(localhost, 0), Config::default()).unwrap();
    let server_addr = server.local_addr().unwrap();

    let client = Listener::bind(SocketAddr::new(localhost, 0), Config::default()).unwrap();

    let server_loop = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };
    let client_loop = {
        let client = client.clone();
        tokio::spawn(async move { client.run().await })
    };

    let (accepted, dialed) = tokio::join!(server.accept(), client.connect(server_addr));
    let accepted = accepted.unwrap();
    let dialed = dialed.unwrap();

    dialed.write(b"hello from client").await.unwrap();

    let mut buf = [0u8; 256];
    let n = tokio::time::timeout(Duration::from_secs(2), accepted.read(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(&buf[..n], b"hello from client");

    accepted.write(b"hello back").await.unwrap();
    let n = tokio::time::timeout(Duration::from_secs(2), dialed.read(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(&buf[..n], b"hello back");

    dialed.close().await.unwrap();
    let err = tokio::time::timeout(Duration::from_secs(2), accepted.read(&mut buf))
        .await
        .expect("read timed out");
    assert!(err.is_err());

    server.close();
    client.close();
    server_loop.abort();
    client_loop.abort();
}

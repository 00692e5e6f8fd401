//! The listener: owns the shared endpoint, runs the receive loop, demultiplexes inbound packets
//! to connections or the handshake engine, and exposes the accept/dial surface.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Notify};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::ListenerMetrics;

use super::connection::{Connection, ConnectionId, SocketId};
use super::endpoint::{PacketEndpoint, UdpEndpoint};
use super::handshake;
use super::handshake_packet::HandshakePacket;
use super::header::{Header, PacketType};
use super::packet::{ControlPacket, DataPacket};
use super::sequence::Sequence;

fn random_31() -> u32 {
    rand::random::<u32>() & 0x7FFF_FFFF
}

fn monotonic_now() -> std::time::Duration {
    // SystemTime isn't truly monotonic, but the cookie only needs minute-granularity agreement
    // between the Induction and Conclusion of a single handshake, seconds apart.
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

fn is_handshake(buf: &[u8]) -> bool {
    buf.len() >= 2 && (u16::from_be_bytes([buf[0], buf[1]]) & 0x7FFF) == 0
}

/// A dial started by [`Listener::connect`] and still waiting for message 4.
struct PendingDial<E: PacketEndpoint> {
    local_initial_seq: Sequence,
    result: oneshot::Sender<Result<Arc<Connection<E>>>>,
}

struct ListenerState<E: PacketEndpoint> {
    socks: HashMap<ConnectionId, Arc<Connection<E>>>,
    conng: HashMap<u32, PendingDial<E>>,
}

/// Demultiplexes one shared [`PacketEndpoint`] across every connection it has accepted or
/// dialed, and runs the handshake engine for inbound traffic addressed to socket id 0.
pub struct Listener<E: PacketEndpoint> {
    endpoint: Arc<E>,
    config: Config,
    cookie_seed: (u64, u64),
    state: Mutex<ListenerState<E>>,
    accept_tx: mpsc::Sender<Arc<Connection<E>>>,
    accept_rx: AsyncMutex<mpsc::Receiver<Arc<Connection<E>>>>,
    stopped: Notify,
    closed: AtomicBool,
    pub metrics: ListenerMetrics,
}

impl Listener<UdpEndpoint> {
    pub fn bind(addr: SocketAddr, config: Config) -> std::io::Result<Arc<Self>> {
        let endpoint = UdpEndpoint::bind(addr, 0)?;
        Ok(Self::new(Arc::new(endpoint), config))
    }
}

impl<E> Listener<E>
where
    E: PacketEndpoint + 'static,
{
    pub fn new(endpoint: Arc<E>, config: Config) -> Arc<Self> {
        let (accept_tx, accept_rx) = mpsc::channel(config.accept_queue.max(1));

        Arc::new(Self {
            endpoint,
            config,
            cookie_seed: (rand::random(), rand::random()),
            state: Mutex::new(ListenerState {
                socks: HashMap::new(),
                conng: HashMap::new(),
            }),
            accept_tx,
            accept_rx: AsyncMutex::new(accept_rx),
            stopped: Notify::new(),
            closed: AtomicBool::new(false),
            metrics: ListenerMetrics::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Stops the receive loop and wakes any blocked `accept()`/`connect()` callers. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stopped.notify_waiters();
    }

    /// Runs the receive loop until `close()` is called or the endpoint errors. Intended to be
    /// spawned as a background task; a `Listener` does nothing on its own otherwise.
    pub async fn run(&self) {
        let mut buf = vec![0u8; 2000];

        loop {
            let (n, addr) = tokio::select! {
                _ = self.stopped.notified() => return,
                res = self.endpoint.recv_from(&mut buf) => match res {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::warn!(error = %err, "listener recv_from failed");
                        return;
                    }
                },
            };

            self.dispatch(&buf[..n], addr).await;
        }
    }

    async fn dispatch(&self, buf: &[u8], addr: SocketAddr) {
        match Header::classify(buf) {
            Err(_) => {
                self.metrics.malformed_packets.inc();
                tracing::debug!(%addr, "malformed packet: too short to classify");
            }
            Ok(PacketType::Control) if is_handshake(buf) => self.handle_handshake(buf, addr).await,
            Ok(PacketType::Control) => self.handle_control(buf, addr).await,
            Ok(PacketType::Data) => self.handle_data(buf, addr).await,
        }
    }

    fn lookup(&self, addr: SocketAddr, destination_socket_id: u32) -> Option<Arc<Connection<E>>> {
        let id = ConnectionId {
            addr,
            local_socket_id: SocketId(destination_socket_id),
        };
        self.state.lock().socks.get(&id).cloned()
    }

    async fn handle_data(&self, buf: &[u8], addr: SocketAddr) {
        let packet = match DataPacket::decode(buf) {
            Ok(p) => p,
            Err(_) => {
                self.metrics.malformed_packets.inc();
                return;
            }
        };

        match self.lookup(addr, packet.destination_socket_id) {
            Some(conn) => {
                if let Err(err) = conn.on_data(packet).await {
                    tracing::debug!(%addr, error = %err, "on_data failed");
                }
            }
            None => {
                self.metrics.unknown_connection.inc();
                tracing::debug!(%addr, sid = packet.destination_socket_id, "data for unknown connection, dropped");
            }
        }
    }

    async fn handle_control(&self, buf: &[u8], addr: SocketAddr) {
        let packet = match ControlPacket::decode(buf) {
            Ok(p) => p,
            Err(_) => {
                self.metrics.malformed_packets.inc();
                return;
            }
        };

        match self.lookup(addr, packet.destination_socket_id) {
            Some(conn) => {
                if let Err(err) = conn.on_control(packet).await {
                    tracing::debug!(%addr, error = %err, "on_control failed");
                }
            }
            None => {
                self.metrics.unknown_connection.inc();
                tracing::debug!(%addr, sid = packet.destination_socket_id, "control for unknown connection, dropped");
            }
        }
    }

    async fn handle_handshake(&self, buf: &[u8], addr: SocketAddr) {
        let packet = match HandshakePacket::decode(buf) {
            Ok(p) => p,
            Err(_) => {
                self.metrics.malformed_packets.inc();
                tracing::debug!(%addr, "malformed handshake packet");
                return;
            }
        };

        let dest = packet.header.destination_socket_id;

        // A nonzero destination matching a pending dial means this is message 2 or message 4
        // addressed back to us, not a fresh inbound handshake to accept.
        if dest != 0 && self.state.lock().conng.contains_key(&dest) {
            self.handle_dial_response(packet, dest, addr).await;
            return;
        }

        match packet.handshake_type {
            super::handshake_packet::HandshakeType::Induction => self.handle_induction(packet, addr).await,
            super::handshake_packet::HandshakeType::Conclusion => self.handle_conclusion(packet, addr).await,
            _ => {
                self.metrics.bad_handshake.inc();
                tracing::debug!(%addr, "unsupported handshake type");
            }
        }
    }

    async fn handle_induction(&self, packet: HandshakePacket, addr: SocketAddr) {
        if let Err(err) = handshake::validate_induction(&packet, &self.config) {
            self.count_rejection(&err);
            tracing::debug!(%addr, error = %err, "rejected induction");
            return;
        }

        let response = handshake::induction_response(&packet, addr, monotonic_now(), self.cookie_seed.0, self.cookie_seed.1, &self.config);

        if let Err(err) = self.endpoint.send_to(&response.encode(), addr).await {
            tracing::debug!(%addr, error = %err, "failed to send induction response");
        }
    }

    async fn handle_conclusion(&self, packet: HandshakePacket, addr: SocketAddr) {
        if let Err(err) = handshake::validate_conclusion(&packet, addr, monotonic_now(), self.cookie_seed.0, self.cookie_seed.1, &self.config) {
            self.count_rejection(&err);
            self.metrics.handshakes_rejected.inc();
            tracing::debug!(%addr, error = %err, "rejected conclusion");
            return;
        }

        let permit = match self.accept_tx.try_reserve() {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.accept_overflow.inc();
                tracing::warn!(%addr, "accept queue full, dropping conclusion");
                return;
            }
        };

        let server_socket_id = random_31();
        let local_initial_seq = Sequence::from(random_31());

        let response = handshake::conclusion_response(&packet, local_initial_seq, server_socket_id, &self.config);

        if let Err(err) = self.endpoint.send_to(&response.encode(), addr).await {
            tracing::debug!(%addr, error = %err, "failed to send conclusion response");
            return;
        }

        let id = ConnectionId {
            addr,
            local_socket_id: SocketId(server_socket_id),
        };
        let conn = Arc::new(Connection::new(
            id,
            SocketId(packet.srt_socket_id),
            self.endpoint.clone(),
            self.config.mtu,
            local_initial_seq,
            packet.initial_sequence_number,
        ));

        self.state.lock().socks.insert(id, conn.clone());
        self.metrics.handshakes_accepted.inc();
        permit.send(conn);
    }

    async fn handle_dial_response(&self, packet: HandshakePacket, stream_id: u32, addr: SocketAddr) {
        match packet.handshake_type {
            super::handshake_packet::HandshakeType::Induction => {
                let local_initial_seq = match self.state.lock().conng.get(&stream_id) {
                    Some(pending) => pending.local_initial_seq,
                    None => return,
                };

                if let Err(err) = handshake::validate_induction_response(&packet) {
                    self.fail_pending(stream_id, err);
                    return;
                }

                let request = handshake::conclusion_request(&packet, stream_id, local_initial_seq, &self.config);
                if let Err(err) = self.endpoint.send_to(&request.encode(), addr).await {
                    self.fail_pending(stream_id, Error::WriteFailed(err));
                }
            }
            super::handshake_packet::HandshakeType::Conclusion => {
                let pending = self.state.lock().conng.remove(&stream_id);
                let Some(pending) = pending else { return };

                if let Err(err) = handshake::validate_conclusion_response(&packet) {
                    let _ = pending.result.send(Err(err));
                    return;
                }

                let id = ConnectionId {
                    addr,
                    local_socket_id: SocketId(stream_id),
                };
                let conn = Arc::new(Connection::new(
                    id,
                    SocketId(packet.srt_socket_id),
                    self.endpoint.clone(),
                    self.config.mtu,
                    pending.local_initial_seq,
                    packet.initial_sequence_number,
                ));

                self.state.lock().socks.insert(id, conn.clone());
                let _ = pending.result.send(Ok(conn));
            }
            _ => {
                self.fail_pending(stream_id, Error::BadHandshake("unexpected type on pending dial"));
            }
        }
    }

    fn fail_pending(&self, stream_id: u32, err: Error) {
        if let Some(pending) = self.state.lock().conng.remove(&stream_id) {
            let _ = pending.result.send(Err(err));
        }
    }

    fn count_rejection(&self, err: &Error) {
        match err {
            Error::BadEncryption(_) => self.metrics.bad_encryption.inc(),
            Error::BadCookie => self.metrics.bad_cookie.inc(),
            Error::BadHandshake(_) => self.metrics.bad_handshake.inc(),
            _ => self.metrics.bad_handshake.inc(),
        }
    }

    /// Initiates a dial: sends an Induction and waits for the four-way handshake to complete.
    ///
    /// Cancel-safe: dropping this future (e.g. inside a `tokio::time::timeout` that elapsed)
    /// removes the pending-dial record so a late message 4 is silently dropped instead of
    /// resolving a future nobody is waiting on.
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr) -> Result<Arc<Connection<E>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let stream_id = random_31();
        let local_initial_seq = Sequence::from(random_31());
        let (tx, rx) = oneshot::channel();

        self.state.lock().conng.insert(
            stream_id,
            PendingDial {
                local_initial_seq,
                result: tx,
            },
        );

        let _guard = PendingDialGuard {
            listener: self.clone(),
            stream_id,
        };

        let request = handshake::induction_request(stream_id, local_initial_seq, &self.config);
        self.endpoint.send_to(&request.encode(), addr).await.map_err(Error::WriteFailed)?;

        rx.await.map_err(|_| Error::Closed)?
    }

    /// Waits for the next accepted connection.
    pub async fn accept(&self) -> Result<Arc<Connection<E>>> {
        let mut rx = self.accept_rx.lock().await;

        tokio::select! {
            _ = self.stopped.notified() => Err(Error::Closed),
            conn = rx.recv() => conn.ok_or(Error::Closed),
        }
    }
}

/// Removes a pending dial's record when the dial future is dropped before it resolves —
/// cancellation, or a `tokio::time::timeout` elapsing.
struct PendingDialGuard<E: PacketEndpoint> {
    listener: Arc<Listener<E>>,
    stream_id: u32,
}

impl<E: PacketEndpoint> Drop for PendingDialGuard<E> {
    fn drop(&mut self) {
        self.listener.state.lock().conng.remove(&self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srt::handshake_packet::HandshakeType;
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc as tmpsc;

    /// An in-memory endpoint pair driving a listener under test without a real socket: `inbox`
    /// is fed by the test, `sent` records every outgoing packet for assertions.
    struct TestEndpoint {
        sent: StdMutex<Vec<(Bytes, SocketAddr)>>,
        inbox: AsyncMutex<tmpsc::UnboundedReceiver<(Bytes, SocketAddr)>>,
    }

    impl PacketEndpoint for TestEndpoint {
        async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
            let mut inbox = self.inbox.lock().await;
            match inbox.recv().await {
                Some((bytes, addr)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok((bytes.len(), addr))
                }
                None => std::future::pending().await,
            }
        }

        async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
            self.sent.lock().unwrap().push((Bytes::copy_from_slice(buf), addr));
            Ok(buf.len())
        }

        fn local_addr(&self) -> std::io::Result<SocketAddr> {
            Ok("127.0.0.1:6000".parse().unwrap())
        }
    }

    fn listener_with_endpoint() -> (Arc<Listener<TestEndpoint>>, tmpsc::UnboundedSender<(Bytes, SocketAddr)>) {
        let (tx, rx) = tmpsc::unbounded_channel();
        let endpoint = Arc::new(TestEndpoint {
            sent: StdMutex::new(Vec::new()),
            inbox: AsyncMutex::new(rx),
        });
        (Listener::new(endpoint, Config::default()), tx)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_induction_then_conclusion_completes_accept() {
        let (listener, _feed) = listener_with_endpoint();

        let client_id = 0x209e_7d6d;
        let config = Config::default();

        let induction = handshake::induction_request(client_id, Sequence::from(0x2688_4789), &config);
        listener.dispatch(&induction.encode(), peer()).await;

        {
            let sent = listener.endpoint.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            let resp = HandshakePacket::decode(&sent[0].0).unwrap();
            assert_eq!(resp.handshake_type, HandshakeType::Induction);
            assert_eq!(resp.header.destination_socket_id, client_id);
        }

        let induction_resp = {
            let sent = listener.endpoint.sent.lock().unwrap();
            HandshakePacket::decode(&sent[0].0).unwrap()
        };

        let conclusion = handshake::conclusion_request(&induction_resp, client_id, Sequence::from(0x2688_4789), &config);
        listener.dispatch(&conclusion.encode(), peer()).await;

        let accepted = listener.accept().await.unwrap();
        assert_eq!(accepted.remote_addr(), peer());

        assert_eq!(listener.metrics.handshakes_accepted.get(), 1);
    }

    #[tokio::test]
    async fn test_bad_encryption_rejected_and_counted() {
        let (listener, _feed) = listener_with_endpoint();
        let config = Config::default();

        let mut induction = handshake::induction_request(1, Sequence::from(1), &config);
        induction.encryption_field = 3;

        listener.dispatch(&induction.encode(), peer()).await;

        assert_eq!(listener.metrics.bad_encryption.get(), 1);
        assert!(listener.endpoint.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_queue_overflow_counted_not_panicking() {
        let (listener, _feed) = listener_with_endpoint();
        let config = Config::default();

        // accept_queue defaults to 2: fill it, then overflow on the third.
        for i in 0..3u32 {
            let client_id = 100 + i;
            let induction = handshake::induction_request(client_id, Sequence::from(1), &config);
            listener.dispatch(&induction.encode(), peer()).await;

            let induction_resp = {
                let sent = listener.endpoint.sent.lock().unwrap();
                HandshakePacket::decode(&sent.last().unwrap().0).unwrap()
            };
            let conclusion = handshake::conclusion_request(&induction_resp, client_id, Sequence::from(1), &config);
            listener.dispatch(&conclusion.encode(), peer()).await;
        }

        assert_eq!(listener.metrics.handshakes_accepted.get(), 2);
        assert_eq!(listener.metrics.accept_overflow.get(), 1);
    }
}

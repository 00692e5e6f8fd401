//! The per-session `Connection`: sequence counters, the reassembly queue, and the reliable
//! stream API (`read`/`write`/`close`) built on top of them.
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::metrics::ConnectionMetrics;

use super::control;
use super::endpoint::PacketEndpoint;
use super::message::MessageNumber;
use super::packet::{ControlPacket, ControlPacketType, DataFlags, DataPacket};
use super::reassembly::{ReadOutcome, ReassemblyQueue};
use super::sequence::Sequence;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(pub u32);

impl From<u32> for SocketId {
    fn from(src: u32) -> Self {
        Self(src)
    }
}

/// The demultiplexing key: an active connection is addressed by the peer's socket address plus
/// the local socket id the peer is sending to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub addr: SocketAddr,
    pub local_socket_id: SocketId,
}

/// Bounds how many outstanding Light-ACKs are tracked for AckAck matching; this core does not
/// use the round trip for anything beyond opportunistic bookkeeping, so a small bound is enough
/// to avoid unbounded growth if the peer never answers.
const INFLIGHT_ACK_CAPACITY: usize = 64;

#[derive(Default)]
struct AckQueue {
    entries: VecDeque<u32>,
}

impl AckQueue {
    fn push(&mut self, ack: u32) {
        if self.entries.len() >= INFLIGHT_ACK_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(ack);
    }

    fn pop_matching(&mut self, ack: u32) -> bool {
        if let Some(pos) = self.entries.iter().position(|&a| a == ack) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }
}

struct ConnectionInner {
    send_seq: Sequence,
    send_msg: MessageNumber,
    recv_queue: ReassemblyQueue,
    inflight_acks: AckQueue,
}

/// One SRT session multiplexed over a shared [`PacketEndpoint`].
///
/// All sequence and queue mutation happens under `inner`'s lock; the wakeup [`Notify`] is
/// signalled outside the lock (`Notify::notify_one` already coalesces repeated signals into a
/// single pending permit, which is exactly the "at most one wakeup between two Reads" property).
pub struct Connection<E: PacketEndpoint> {
    pub id: ConnectionId,
    remote_socket_id: SocketId,
    endpoint: Arc<E>,
    epoch: Instant,
    mtu: u32,
    inner: Mutex<ConnectionInner>,
    read_wakeup: Notify,
    closed: AtomicBool,
    pub metrics: ConnectionMetrics,
}

impl<E> Connection<E>
where
    E: PacketEndpoint,
{
    pub fn new(
        id: ConnectionId,
        remote_socket_id: SocketId,
        endpoint: Arc<E>,
        mtu: u32,
        local_initial_seq: Sequence,
        remote_initial_seq: Sequence,
    ) -> Self {
        Self {
            id,
            remote_socket_id,
            endpoint,
            epoch: Instant::now(),
            mtu,
            inner: Mutex::new(ConnectionInner {
                send_seq: local_initial_seq,
                send_msg: MessageNumber::from(0),
                recv_queue: ReassemblyQueue::new(remote_initial_seq),
                inflight_acks: AckQueue::default(),
            }),
            read_wakeup: Notify::new(),
            closed: AtomicBool::new(false),
            metrics: ConnectionMetrics::new(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.id.addr
    }

    fn timestamp(&self) -> u32 {
        self.epoch.elapsed().as_micros() as u32
    }

    /// Segments `buf` into data packets no larger than `mtu - 16` bytes each, tags the first and
    /// last with the message-boundary flags (or both, as `Single`, for a one-packet message),
    /// and sends all of them. The send sequence advances by the *packet* count, not the byte
    /// count — the reference implementation advances by bytes, which is a protocol bug.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let payload_cap = (self.mtu.saturating_sub(16)).max(1) as usize;
        let chunks: Vec<&[u8]> = if buf.is_empty() {
            vec![&buf[0..0]]
        } else {
            buf.chunks(payload_cap).collect()
        };

        let (start_seq, msg) = {
            let mut inner = self.inner.lock();
            let start_seq = inner.send_seq;
            let msg = inner.send_msg;
            inner.send_seq += chunks.len() as u32;
            inner.send_msg += 1;
            (start_seq, msg)
        };

        let timestamp = self.timestamp();
        let last_index = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut flags = DataFlags::ORDERED;
            if i == 0 {
                flags |= DataFlags::FIRST;
            }
            if i == last_index {
                flags |= DataFlags::LAST;
            }

            let packet = DataPacket {
                sequence: start_seq + i as u32,
                flags,
                message_number: msg,
                timestamp,
                destination_socket_id: self.remote_socket_id.0,
                payload: Bytes::copy_from_slice(chunk),
            };

            let wire = packet.encode();
            self.endpoint
                .send_to(&wire, self.id.addr)
                .await
                .map_err(Error::WriteFailed)?;

            self.metrics.data_packets_sent.inc();
            self.metrics.data_bytes_sent.add(chunk.len());
        }

        Ok(buf.len())
    }

    /// Blocks until exactly one complete application message is available, EOF is observed, or
    /// the connection is closed.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            {
                let mut inner = self.inner.lock();
                match inner.recv_queue.read(buf)? {
                    ReadOutcome::Ready(n) => return Ok(n),
                    ReadOutcome::Eof => return Err(Error::Eof),
                    ReadOutcome::Wait => {}
                }
            }

            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }

            self.read_wakeup.notified().await;
        }
    }

    /// Sends a Shutdown control packet and releases any blocked reader. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let packet = control::shutdown(self.timestamp(), self.remote_socket_id.0);
        let _ = self.endpoint.send_to(&packet.encode(), self.id.addr).await;
        self.read_wakeup.notify_waiters();

        Ok(())
    }

    /// Called by the listener's receive loop when a data packet arrives for this connection.
    pub async fn on_data(&self, packet: DataPacket) -> Result<()> {
        self.metrics.data_packets_recv.inc();
        self.metrics.data_bytes_recv.add(packet.payload.len());

        let ack = {
            let mut inner = self.inner.lock();
            inner.recv_queue.insert(packet);
            inner.recv_queue.ack()
        };

        self.read_wakeup.notify_one();
        self.send_light_ack(ack).await
    }

    /// Called by the listener's receive loop when a non-handshake control packet arrives for
    /// this connection.
    pub async fn on_control(&self, packet: ControlPacket) -> Result<()> {
        self.metrics.ctrl_packets_recv.inc();

        match packet.control_type {
            ControlPacketType::Shutdown => {
                {
                    let mut inner = self.inner.lock();
                    inner.recv_queue.insert_eof();
                }
                self.read_wakeup.notify_one();
            }
            ControlPacketType::Keepalive => {
                let reply = control::keepalive(self.timestamp(), self.remote_socket_id.0);
                let _ = self.endpoint.send_to(&reply.encode(), self.id.addr).await;
            }
            ControlPacketType::Nak => {
                tracing::trace!(seq = packet.type_specific, "received NAK, no-op");
            }
            ControlPacketType::CongestionWarning => {
                tracing::warn!("received congestion warning, no-op");
            }
            ControlPacketType::AckAck => {
                let mut inner = self.inner.lock();
                inner.inflight_acks.pop_matching(packet.type_specific);
            }
            ControlPacketType::DropRequest => {
                tracing::trace!(msg = packet.type_specific, "received drop request, no-op");
            }
            ControlPacketType::Ack | ControlPacketType::Handshake | ControlPacketType::PeerError | ControlPacketType::UserDefined => {
                tracing::trace!(?packet.control_type, "unhandled control type on established connection");
            }
        }

        Ok(())
    }

    async fn send_light_ack(&self, cumulative_ack: Sequence) -> Result<()> {
        let packet = control::light_ack(cumulative_ack, self.timestamp(), self.remote_socket_id.0);

        {
            let mut inner = self.inner.lock();
            inner.inflight_acks.push(packet.type_specific);
        }

        self.endpoint
            .send_to(&packet.encode(), self.id.addr)
            .await
            .map_err(Error::WriteFailed)?;

        self.metrics.ctrl_packets_sent.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srt::endpoint::PacketEndpoint;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct LoopbackEndpoint {
        sent: StdMutex<Vec<(Bytes, SocketAddr)>>,
    }

    impl PacketEndpoint for LoopbackEndpoint {
        async fn recv_from(&self, _buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
            std::future::pending().await
        }

        async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
            self.sent.lock().unwrap().push((Bytes::copy_from_slice(buf), addr));
            Ok(buf.len())
        }

        fn local_addr(&self) -> std::io::Result<SocketAddr> {
            Ok("127.0.0.1:4000".parse().unwrap())
        }
    }

    fn conn() -> Connection<LoopbackEndpoint> {
        Connection::new(
            ConnectionId {
                addr: "127.0.0.1:5000".parse().unwrap(),
                local_socket_id: SocketId(1),
            },
            SocketId(2),
            Arc::new(LoopbackEndpoint::default()),
            1500,
            Sequence::from(0),
            Sequence::from(100),
        )
    }

    #[tokio::test]
    async fn test_write_segments_and_flags_boundaries() {
        let c = conn();
        let payload = vec![7u8; (1500 - 16) * 2 + 10];
        let n = c.write(&payload).await.unwrap();
        assert_eq!(n, payload.len());

        let sent = c.endpoint.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);

        let first = DataPacket::decode(&sent[0].0).unwrap();
        assert!(first.flags.is_first());
        assert!(!first.flags.is_last());

        let last = DataPacket::decode(&sent[2].0).unwrap();
        assert!(last.flags.is_last());
        assert!(!last.flags.is_first());
    }

    #[tokio::test]
    async fn test_receive_then_read_delivers_message() {
        let c = conn();

        let p = DataPacket {
            sequence: Sequence::from(101),
            flags: DataFlags::FIRST | DataFlags::LAST,
            message_number: MessageNumber::from(0),
            timestamp: 0,
            destination_socket_id: 1,
            payload: Bytes::from_static(b"hi"),
        };

        c.on_data(p).await.unwrap();

        let mut buf = [0u8; 16];
        let n = c.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[tokio::test]
    async fn test_shutdown_then_read_returns_eof() {
        let c = conn();
        c.on_control(ControlPacket {
            control_type: ControlPacketType::Shutdown,
            subtype: 0,
            type_specific: 0,
            timestamp: 0,
            destination_socket_id: 1,
        })
        .await
        .unwrap();

        let mut buf = [0u8; 16];
        assert!(matches!(c.read(&mut buf).await, Err(Error::Eof)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_wakes_reader() {
        let c = Arc::new(conn());
        let reader = {
            let c = c.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                c.read(&mut buf).await
            })
        };

        tokio::task::yield_now().await;
        c.close().await.unwrap();
        c.close().await.unwrap();

        assert!(matches!(reader.await.unwrap(), Err(Error::Closed)));
    }
}

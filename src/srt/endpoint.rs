//! The packet endpoint abstraction: the one external collaborator the engine depends on.
//!
//! The spec treats the datagram socket itself as out of scope ("an abstract packet endpoint
//! supporting addressed send and receive"). [`PacketEndpoint`] is that abstraction; [`UdpEndpoint`]
//! is the concrete UDP-backed implementation, and `tests` elsewhere in the crate use an
//! in-memory implementation to drive the handshake engine without a real socket.
use std::io::{ErrorKind, IoSlice, Result};
use std::net::SocketAddr;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::UdpSocket;

/// Addressed send/receive over an unreliable datagram transport.
pub trait PacketEndpoint: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

/// A UDP socket tuned the way the reference listener wants it: non-blocking, a large receive
/// buffer, and vectored sends available for callers that want to avoid copying header + payload
/// into one buffer.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    pub fn bind(addr: SocketAddr, rcvbuf: usize) -> Result<Self> {
        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        if rcvbuf > 0 {
            socket.set_recv_buffer_size(rcvbuf)?;
        }

        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self { socket })
    }

    pub async fn send_to_vectored(&self, bufs: &[IoSlice<'_>], addr: SocketAddr) -> Result<usize> {
        loop {
            self.socket.writable().await?;

            match SockRef::from(&self.socket).send_to_vectored(bufs, &addr.into()) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() != ErrorKind::WouldBlock => return Err(err),
                _ => (),
            }
        }
    }
}

impl PacketEndpoint for UdpEndpoint {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize> {
        self.socket.send_to(buf, addr).await
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }
}

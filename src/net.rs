//! The datagram capability the core state machines run on top of.
//!
//! Kept as a trait so the sender/receiver loops can be driven by a real
//! `UdpSocket` in production and by an in-memory double in tests, without the
//! protocol logic ever knowing the difference.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

pub trait DatagramEndpoint {
    /// Send one datagram to `addr`.
    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for one datagram. `Ok(None)` means the timeout
    /// elapsed with nothing to read; `Err` means a genuine socket fault
    /// (connection refused, etc).
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<(SocketAddr, Vec<u8>)>>;

    /// The address this endpoint is bound to, for diagnostics.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(UdpEndpoint { socket })
    }

    /// Bind an ephemeral local port and leave the peer unset until the
    /// first `send_to` call.
    pub fn bind_ephemeral() -> io::Result<Self> {
        Self::bind("0.0.0.0:0")
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        self.socket.send_to(bytes, addr)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Option<(SocketAddr, Vec<u8>)>> {
        self.socket.set_read_timeout(Some(timeout))?;

        let mut buf = [0u8; crate::codec::MAX_SEGMENT];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => Ok(Some((from, buf[..n].to_vec()))),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

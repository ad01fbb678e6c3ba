//! UDP transport
//!
//! One blocking datagram socket per address family, opened on first use and
//! bounded by a receive timeout. The resolver only talks to the [`Transport`]
//! trait so the walk can be driven by scripted replies in tests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
use socket2::SockRef;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Largest possible UDP payload
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Datagram exchange with DNS servers
pub trait Transport {
    /// Send one datagram to `server`
    fn send(&mut self, server: SocketAddr, datagram: &[u8]) -> Result<(), TransportError>;

    /// Length of the next pending datagram from `server`, without consuming it
    fn peek_len(&mut self, server: SocketAddr) -> Result<usize, TransportError>;

    /// Consume the next datagram into `buf`, returning its length
    fn recv(&mut self, server: SocketAddr, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Blocking UDP transport
pub struct UdpTransport {
    timeout: Duration,
    v4: Option<UdpSocket>,
    v6: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            v4: None,
            v6: None,
        }
    }

    /// Socket for the family of `server`, created on first use
    fn socket(&mut self, server: SocketAddr) -> Result<&UdpSocket, TransportError> {
        let timeout = self.timeout;
        let slot = if server.is_ipv4() { &mut self.v4 } else { &mut self.v6 };

        if slot.is_none() {
            let socket = create_socket(server, timeout).map_err(|e| TransportError::from_io(server, e))?;
            *slot = Some(socket);
        }

        slot.as_ref().ok_or_else(|| TransportError::Io {
            server,
            source: std::io::Error::from(std::io::ErrorKind::NotConnected),
        })
    }
}

/// Unconnected datagram socket bound to the unspecified address of the
/// family of `server`
fn create_socket(server: SocketAddr, timeout: Duration) -> std::io::Result<UdpSocket> {
    let (domain, bind_addr) = match server.ip() {
        IpAddr::V4(_) => (Domain::IPV4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
        IpAddr::V6(_) => (Domain::IPV6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.bind(&bind_addr.into())?;
    socket.set_read_timeout(Some(timeout))?;

    debug!("Opened UDP socket for {} (timeout {:?})", server, timeout);
    Ok(socket.into())
}

impl Transport for UdpTransport {
    fn send(&mut self, server: SocketAddr, datagram: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket(server)?;
        let sent = socket
            .send_to(datagram, server)
            .map_err(|e| TransportError::from_io(server, e))?;
        debug!("Sent {} byte query to {}", sent, server);
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn peek_len(&mut self, server: SocketAddr) -> Result<usize, TransportError> {
        let socket = self.socket(server)?;
        // MSG_TRUNC makes the kernel report the full datagram length even
        // though nothing is copied out.
        SockRef::from(socket)
            .recv_with_flags(&mut [], libc::MSG_PEEK | libc::MSG_TRUNC)
            .map_err(|e| TransportError::from_io(server, e))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn peek_len(&mut self, server: SocketAddr) -> Result<usize, TransportError> {
        let socket = self.socket(server)?;
        let mut scratch = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = socket
            .peek_from(&mut scratch)
            .map_err(|e| TransportError::from_io(server, e))?;
        Ok(len)
    }

    fn recv(&mut self, server: SocketAddr, buf: &mut [u8]) -> Result<usize, TransportError> {
        let socket = self.socket(server)?;
        let (len, from) = socket
            .recv_from(buf)
            .map_err(|e| TransportError::from_io(server, e))?;

        if from.ip() != server.ip() {
            warn!("UDP reply from unexpected source {} (expected {})", from, server);
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair() -> (UdpTransport, UdpSocket, SocketAddr) {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        (UdpTransport::new(Duration::from_millis(500)), server, addr)
    }

    #[test]
    fn test_udp_round_trip_with_peek() {
        let (mut transport, server, addr) = loopback_pair();

        transport.send(addr, b"query").unwrap();

        let mut buf = [0u8; 64];
        let (n, client) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"query");

        let reply = vec![0xAB; 300];
        server.send_to(&reply, client).unwrap();

        // Peeking does not consume the datagram
        assert_eq!(transport.peek_len(addr).unwrap(), 300);
        assert_eq!(transport.peek_len(addr).unwrap(), 300);

        let mut exact = vec![0u8; 300];
        assert_eq!(transport.recv(addr, &mut exact).unwrap(), 300);
        assert_eq!(exact, reply);
    }

    #[test]
    fn test_udp_timeout() {
        let (mut transport, _server, addr) = loopback_pair();
        transport.send(addr, b"unanswered").unwrap();

        let err = transport.peek_len(addr).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }
}

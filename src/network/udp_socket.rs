use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::trace;

use crate::DatagramSocket;

const RECV_BUFFER_SIZE: usize = 4096;

/// A non-blocking UDP endpoint connected to a single RCON server.
///
/// The socket binds an ephemeral local port and `connect`s to the server
/// address, so plain `send`/`recv` talk to exactly one peer and datagrams
/// from other sources are filtered by the OS. [`open`](DatagramSocket::open)
/// re-resolves and re-binds, which is what gives reconnects a fresh
/// association.
#[derive(Debug)]
pub struct UdpDatagramSocket {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
    buffer: [u8; RECV_BUFFER_SIZE],
}

impl UdpDatagramSocket {
    /// Creates an endpoint for the given server. No socket is bound until
    /// [`open`](DatagramSocket::open) is called.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
            buffer: [0; RECV_BUFFER_SIZE],
        }
    }

    fn resolve(&self) -> std::io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::AddrNotAvailable,
                    format!("no address found for {}:{}", self.host, self.port),
                )
            })
    }
}

impl DatagramSocket for UdpDatagramSocket {
    fn open(&mut self) -> std::io::Result<()> {
        let server = self.resolve()?;
        let local = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0);
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        socket.connect(server)?;
        trace!(%server, local = %socket.local_addr()?, "datagram association opened");
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> std::io::Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "socket not open"))?;
        socket.send(datagram).map(|_| ())
    }

    fn receive_all(&mut self) -> std::io::Result<Vec<Vec<u8>>> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(std::io::Error::new(
                ErrorKind::NotConnected,
                "socket not open",
            ));
        };

        let mut received = Vec::new();
        loop {
            match socket.recv(&mut self.buffer) {
                Ok(len) => received.push(self.buffer[..len].to_vec()),
                // No more datagrams queued.
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => return Ok(received),
                // Connected UDP sockets surface ICMP port-unreachable as
                // ConnectionReset on the next recv; the association itself
                // is still usable, so keep draining.
                Err(ref err) if err.kind() == ErrorKind::ConnectionReset => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            trace!("datagram association closed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn send_before_open_fails() {
        let mut socket = UdpDatagramSocket::new("127.0.0.1", 2302);
        assert_eq!(
            socket.send(b"ping").unwrap_err().kind(),
            ErrorKind::NotConnected
        );
        assert_eq!(
            socket.receive_all().unwrap_err().kind(),
            ErrorKind::NotConnected
        );
    }

    #[test]
    fn close_is_idempotent() {
        let mut socket = UdpDatagramSocket::new("127.0.0.1", 2302);
        socket.close();
        socket.close();
    }
}

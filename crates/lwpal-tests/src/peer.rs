//! Loopback UDP peer.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// A UDP socket on 127.0.0.1 playing the server side of a connection.
pub struct LoopbackPeer {
    socket: UdpSocket,
}

impl LoopbackPeer {
    /// Binds to an ephemeral loopback port.
    pub fn bind() -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        socket.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self { socket })
    }

    /// Local address.
    pub fn addr(&self) -> SocketAddr {
        self.socket
            .local_addr()
            .expect("bound socket has a local address")
    }

    /// Port as the string the engine passes to `open`.
    pub fn port(&self) -> String {
        self.addr().port().to_string()
    }

    /// Waits for one datagram; returns it and its sender.
    pub fn recv_from(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = [0u8; 2048];
        let (n, from) = self.socket.recv_from(&mut buf)?;
        Ok((buf[..n].to_vec(), from))
    }

    /// Sends one datagram to `to`.
    pub fn send_to(&self, payload: &[u8], to: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(payload, to)
    }
}

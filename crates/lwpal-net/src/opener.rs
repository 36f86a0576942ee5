//! Opening datagram connections for the engine.
//!
//! A hostname and port resolve to IPv4 candidates, tried in resolver order.
//! Each candidate gets a fresh UDP socket, optionally bound to credentials
//! through a `SecurityBinder`, then connected. The first candidate that gets
//! through both steps becomes the connection; every other socket is closed.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::os::fd::IntoRawFd;
use std::sync::Arc;

use lwpal_core::{ConnectionType, Handle, PlatformError};
use tracing::{debug, info, warn};

/// Peer certificate verification requested from the security provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerVerify {
    /// No verification; the engine authenticates the peer itself.
    None,
    /// Verify when the peer presents a certificate.
    Optional,
    /// Fail the handshake unless the peer verifies.
    Required,
}

/// Security parameters attached to a socket before it connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityAssociation {
    /// Credential tag provisioned in the security provider
    pub tag: u32,
    /// Peer verification mode
    pub peer_verify: PeerVerify,
}

/// Attaches DTLS credentials to a socket.
///
/// Implemented by the transport security provider of the host. A failure
/// rejects the candidate; the opener never falls back to a plain socket.
pub trait SecurityBinder: Send + Sync {
    /// Binds `association` to `socket`, which is not connected yet.
    fn bind(&self, socket: &UdpSocket, association: &SecurityAssociation) -> io::Result<()>;
}

/// Opens connected datagram sockets and hands them out as handles.
pub struct ConnectionOpener {
    association: SecurityAssociation,
    binder: Option<Arc<dyn SecurityBinder>>,
}

impl ConnectionOpener {
    /// Creates an opener for plain sockets; `security_tag` is used once a
    /// binder is attached.
    pub fn new(security_tag: u32) -> Self {
        Self {
            association: SecurityAssociation {
                tag: security_tag,
                peer_verify: PeerVerify::None,
            },
            binder: None,
        }
    }

    /// Secures every socket opened from now on with `binder`.
    pub fn with_binder(mut self, binder: Arc<dyn SecurityBinder>) -> Self {
        self.set_binder(binder);
        self
    }

    /// Replaces the security binder in place.
    pub fn set_binder(&mut self, binder: Arc<dyn SecurityBinder>) {
        self.binder = Some(binder);
    }

    /// Returns true if sockets are bound to credentials before connecting.
    pub fn is_secured(&self) -> bool {
        self.binder.is_some()
    }

    /// Opens a connection to `host:port`.
    ///
    /// On success exactly one connected socket stays open; on failure none.
    pub fn open(
        &self,
        kind: ConnectionType,
        host: &str,
        port: &str,
    ) -> Result<Handle, PlatformError> {
        if kind != ConnectionType::Datagram {
            warn!(%kind, "Only datagram connections are supported");
            return Err(PlatformError::UnsupportedTransport(kind));
        }

        let candidates = resolve(host, port)?;
        debug!(host, port, candidates = candidates.len(), "Resolved peer");

        match self.connect_any(&candidates) {
            Some((addr, socket)) => {
                let handle = Handle::encode(socket.into_raw_fd());
                info!(host, port, %addr, %handle, secured = self.is_secured(), "Connection opened");
                Ok(handle)
            }
            None => Err(PlatformError::ConnectionFailed {
                host: host.to_string(),
                port: port.to_string(),
            }),
        }
    }

    /// Returns the first candidate that binds and connects. Sockets of
    /// rejected candidates are closed on the way.
    fn connect_any(&self, candidates: &[SocketAddrV4]) -> Option<(SocketAddrV4, UdpSocket)> {
        candidates
            .iter()
            .find_map(|&addr| match self.connect_candidate(addr) {
                Ok(socket) => Some((addr, socket)),
                Err(e) => {
                    warn!(%addr, error = %e, "Candidate address failed");
                    None
                }
            })
    }

    fn connect_candidate(&self, addr: SocketAddrV4) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        if let Some(binder) = &self.binder {
            binder.bind(&socket, &self.association)?;
        }
        socket.connect(addr)?;
        Ok(socket)
    }
}

/// Resolves A records only.
fn resolve(host: &str, port: &str) -> Result<Vec<SocketAddrV4>, PlatformError> {
    let resolve_error = |source: io::Error| PlatformError::Resolve {
        host: host.to_string(),
        port: port.to_string(),
        source,
    };

    let port_number: u16 = port.parse().map_err(|_| {
        resolve_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "port is not a number in 0..=65535",
        ))
    })?;

    let candidates: Vec<SocketAddrV4> = (host, port_number)
        .to_socket_addrs()
        .map_err(resolve_error)?
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .collect();

    if candidates.is_empty() {
        return Err(resolve_error(io::Error::new(
            io::ErrorKind::NotFound,
            "no IPv4 address",
        )));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_resolve_literal() {
        let candidates = resolve("127.0.0.1", "5683").unwrap();
        assert_eq!(candidates, vec![SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5683)]);
    }

    #[test]
    fn test_resolve_skips_ipv6() {
        let err = resolve("::1", "5683").unwrap_err();
        assert!(matches!(err, PlatformError::Resolve { .. }));
    }

    #[test]
    fn test_resolve_rejects_bad_port() {
        for port in ["", "coap", "70000", "-1"] {
            let err = resolve("127.0.0.1", port).unwrap_err();
            assert!(matches!(err, PlatformError::Resolve { .. }), "{port}");
        }
    }

    #[test]
    fn test_unsupported_transport() {
        let opener = ConnectionOpener::new(0);
        for kind in [ConnectionType::Stream, ConnectionType::Sms, ConnectionType::LoRaWan] {
            let err = opener.open(kind, "127.0.0.1", "5683").unwrap_err();
            assert!(matches!(err, PlatformError::UnsupportedTransport(k) if k == kind));
        }
    }

    /// Rejects the first `failures` sockets it is asked to secure.
    struct FlakyBinder {
        failures: usize,
        calls: AtomicUsize,
    }

    impl SecurityBinder for FlakyBinder {
        fn bind(&self, _socket: &UdpSocket, _association: &SecurityAssociation) -> io::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "no credentials"));
            }
            Ok(())
        }
    }

    fn flaky_opener(failures: usize) -> (ConnectionOpener, Arc<FlakyBinder>) {
        let binder = Arc::new(FlakyBinder {
            failures,
            calls: AtomicUsize::new(0),
        });
        (ConnectionOpener::new(1).with_binder(binder.clone()), binder)
    }

    fn two_candidates() -> Vec<SocketAddrV4> {
        vec![
            SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 5683),
            SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 2), 5684),
        ]
    }

    #[test]
    fn test_binding_failure_moves_to_next_candidate() {
        let (opener, binder) = flaky_opener(1);
        let candidates = two_candidates();

        let (addr, socket) = opener.connect_any(&candidates).unwrap();
        assert_eq!(addr, candidates[1]);
        assert_eq!(socket.peer_addr().unwrap(), SocketAddr::V4(candidates[1]));
        assert_eq!(binder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_all_candidates_rejected() {
        let (opener, binder) = flaky_opener(usize::MAX);
        assert!(opener.connect_any(&two_candidates()).is_none());
        assert_eq!(binder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_association_skips_verification() {
        let opener = ConnectionOpener::new(7);
        assert_eq!(opener.association.tag, 7);
        assert_eq!(opener.association.peer_verify, PeerVerify::None);
        assert!(!opener.is_secured());
    }
}

//! Cross-thread wake-up for a blocked readiness wait.
//!
//! A loopback UDP socket bound to an ephemeral port and connected to itself.
//! `signal` leaves at most one byte queued on it; the multiplexer watches it
//! alongside the engine's connections and discards one byte per wake. Extra
//! signals before the byte is drained coalesce: the waiter only needs to know
//! that something changed.

use std::io;
use std::net::{SocketAddrV4, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};

use lwpal_core::PlatformError;
use tracing::{debug, trace, warn};

const WAKE_BYTE: u8 = b'n';

/// Self-connected loopback socket used to interrupt `wait`.
#[derive(Debug)]
pub struct InterruptChannel {
    socket: Option<UdpSocket>,
}

impl InterruptChannel {
    /// Creates the channel bound to `addr` (port 0 picks an ephemeral port).
    pub fn create(addr: SocketAddrV4) -> Result<Self, PlatformError> {
        let socket = UdpSocket::bind(addr).map_err(PlatformError::InterruptSetup)?;
        let local = socket.local_addr().map_err(PlatformError::InterruptSetup)?;
        socket.connect(local).map_err(PlatformError::InterruptSetup)?;
        socket
            .set_nonblocking(true)
            .map_err(PlatformError::InterruptSetup)?;

        debug!(addr = %local, fd = socket.as_raw_fd(), "Interrupt channel created");
        Ok(Self {
            socket: Some(socket),
        })
    }

    /// Wakes the waiter unless a wake is already pending.
    ///
    /// Never blocks and takes no lock, so any thread may call it while another
    /// thread is blocked in `wait`.
    pub fn signal(&self) {
        let Some(socket) = &self.socket else {
            return;
        };

        let mut probe = [0u8; 1];
        match socket.peek(&mut probe) {
            Ok(_) => trace!("Wake already pending"),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if let Err(e) = socket.send(&[WAKE_BYTE]) {
                    warn!(error = %e, "Failed to queue wake byte");
                }
            }
            Err(e) => warn!(error = %e, "Failed to probe interrupt channel"),
        }
    }

    /// Returns true if a wake is queued and not yet drained.
    pub fn is_pending(&self) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        let mut probe = [0u8; 1];
        socket.peek(&mut probe).is_ok()
    }

    /// Discards one queued wake; returns true if one was there.
    pub(crate) fn drain_one(&self) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        let mut byte = [0u8; 1];
        match socket.recv(&mut byte) {
            Ok(_) => {
                trace!("Drained wake byte");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                warn!(error = %e, "Failed to drain interrupt channel");
                false
            }
        }
    }

    /// Descriptor watched by the multiplexer, if the channel is open.
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Returns true until `destroy` is called.
    pub fn is_active(&self) -> bool {
        self.socket.is_some()
    }

    /// Closes the socket. Later calls and later signals are no-ops.
    pub fn destroy(&mut self) {
        if let Some(socket) = self.socket.take() {
            debug!(fd = socket.as_raw_fd(), "Interrupt channel destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn channel() -> InterruptChannel {
        InterruptChannel::create(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap()
    }

    #[test]
    fn test_signal_sets_pending() {
        let channel = channel();
        assert!(!channel.is_pending());
        channel.signal();
        assert!(channel.is_pending());
        assert!(channel.drain_one());
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_signals_coalesce() {
        let channel = channel();
        channel.signal();
        channel.signal();
        channel.signal();

        assert!(channel.drain_one());
        assert!(!channel.drain_one());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut channel = channel();
        assert!(channel.is_active());
        channel.destroy();
        channel.destroy();
        assert!(!channel.is_active());
        assert!(channel.raw_fd().is_none());

        channel.signal();
        assert!(!channel.is_pending());
        assert!(!channel.drain_one());
    }

    #[test]
    fn test_non_loopback_bind_fails_cleanly() {
        // TEST-NET-1 is never assigned to a local interface.
        let result = InterruptChannel::create(SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 0));
        assert!(matches!(result, Err(PlatformError::InterruptSetup(_))));
    }
}

//! Send, receive and close on an open handle.
//!
//! The sockets are connected, so the kernel filters datagrams to the peer
//! chosen at open time.

use std::io;

use lwpal_core::Handle;
use tracing::{debug, trace};

use crate::sys;

/// Sends one datagram.
pub fn send(handle: Handle, buffer: &[u8]) -> io::Result<usize> {
    let sent = sys::send(handle.decode(), buffer)?;
    trace!(%handle, bytes = sent, "Sent");
    Ok(sent)
}

/// Receives one datagram, truncated to `buffer`.
pub fn recv(handle: Handle, buffer: &mut [u8]) -> io::Result<usize> {
    let received = sys::recv(handle.decode(), buffer)?;
    trace!(%handle, bytes = received, "Received");
    Ok(received)
}

/// Closes the connection. The handle must not be used afterwards.
pub fn close(handle: Handle) -> io::Result<()> {
    sys::close(handle.decode())?;
    debug!(%handle, "Connection closed");
    Ok(())
}

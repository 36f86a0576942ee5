//! Native socket and readiness primitives.
//!
//! Descriptors passed here live in the operating system table; no Rust value
//! owns them. Callers only pass descriptors obtained from a successful open
//! that have not been closed yet, except for `is_open`, which probes exactly
//! that.

#![allow(unsafe_code)]

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// One member of a readiness interest set.
pub(crate) type PollEntry = libc::pollfd;

/// Builds an entry waiting for readability of `fd`.
pub(crate) fn read_interest(fd: RawFd) -> PollEntry {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Pending data, a pending socket error and hang-up all make a descriptor
/// readable: the next receive returns without blocking.
pub(crate) fn is_readable(entry: &PollEntry) -> bool {
    entry.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0
}

/// Blocks until a member is readable or `timeout` elapses.
pub(crate) fn poll(entries: &mut [PollEntry], timeout: Duration) -> io::Result<usize> {
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: `entries` is a valid, exclusively borrowed pollfd array for the
    // whole call and its length is passed alongside.
    let rc = unsafe { libc::poll(entries.as_mut_ptr(), entries.len() as libc::nfds_t, millis) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

/// Returns true if `fd` currently names an open descriptor.
pub(crate) fn is_open(fd: RawFd) -> bool {
    // SAFETY: F_GETFD only reads descriptor flags; a stale fd yields EBADF.
    fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1
}

/// Peeks at most one byte without consuming it and without blocking.
pub(crate) fn peek(fd: RawFd) -> io::Result<usize> {
    let mut byte = 0u8;
    // SAFETY: the buffer is one valid writable byte.
    let rc = unsafe {
        libc::recv(
            fd,
            (&mut byte as *mut u8).cast(),
            1,
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    transfer_result(rc)
}

/// Sends on a connected socket.
pub(crate) fn send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    // SAFETY: the pointer and length describe a valid readable slice.
    let rc = unsafe { libc::send(fd, buffer.as_ptr().cast(), buffer.len(), 0) };
    transfer_result(rc)
}

/// Receives from a connected socket.
pub(crate) fn recv(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    // SAFETY: the pointer and length describe a valid writable slice.
    let rc = unsafe { libc::recv(fd, buffer.as_mut_ptr().cast(), buffer.len(), 0) };
    transfer_result(rc)
}

/// Closes a descriptor.
pub(crate) fn close(fd: RawFd) -> io::Result<()> {
    // SAFETY: the caller hands over the descriptor and never uses it again.
    if unsafe { libc::close(fd) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn transfer_result(rc: libc::ssize_t) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::os::fd::{AsRawFd, IntoRawFd};

    fn connected_pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        a.connect(b.local_addr().unwrap()).unwrap();
        b.connect(a.local_addr().unwrap()).unwrap();
        (a, b)
    }

    #[test]
    fn test_poll_times_out() {
        let (a, _b) = connected_pair();
        let mut entries = [read_interest(a.as_raw_fd())];
        let ready = poll(&mut entries, Duration::from_millis(20)).unwrap();
        assert_eq!(ready, 0);
        assert!(!is_readable(&entries[0]));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (a, b) = connected_pair();
        b.send(b"xy").unwrap();

        let mut entries = [read_interest(a.as_raw_fd())];
        assert_eq!(poll(&mut entries, Duration::from_secs(1)).unwrap(), 1);
        assert!(is_readable(&entries[0]));

        assert_eq!(peek(a.as_raw_fd()).unwrap(), 1);
        let mut buf = [0u8; 8];
        assert_eq!(recv(a.as_raw_fd(), &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"xy");
    }

    #[test]
    fn test_peek_empty_would_block() {
        let (a, _b) = connected_pair();
        let err = peek(a.as_raw_fd()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_close_released_descriptor() {
        let (a, _b) = connected_pair();
        let fd = a.into_raw_fd();
        assert!(is_open(fd));
        close(fd).unwrap();
        assert!(!is_open(-1));
    }

    #[test]
    fn test_send_and_recv() {
        let (a, b) = connected_pair();
        assert_eq!(send(a.as_raw_fd(), b"ping").unwrap(), 4);
        let mut buf = [0u8; 8];
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }
}

//! Descriptor accounting.
//!
//! Kept to a single test so nothing else in this binary opens or closes
//! descriptors while counts are compared.

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lwpal_core::{ClosureDetection, ConnectionType, PlatformError};
use lwpal_net::{SecurityAssociation, SecurityBinder};
use lwpal_tests::{init_tracing, open_descriptor_count, test_context, LoopbackPeer};

struct RejectingBinder;

impl SecurityBinder for RejectingBinder {
    fn bind(&self, _socket: &UdpSocket, _association: &SecurityAssociation) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "credential store locked"))
    }
}

#[test]
fn test_open_and_close_do_not_leak_descriptors() {
    init_tracing();
    let context = test_context(ClosureDetection::Peek);
    let secured = test_context(ClosureDetection::Peek).with_security_binder(Arc::new(RejectingBinder));
    let peer = LoopbackPeer::bind().unwrap();
    let port = peer.port();

    let baseline = open_descriptor_count();

    // Unsupported transport: rejected before any socket exists.
    let err = context
        .open(ConnectionType::Stream, "127.0.0.1", &port)
        .unwrap_err();
    assert!(matches!(err, PlatformError::UnsupportedTransport(_)));
    assert_eq!(open_descriptor_count(), baseline);

    // Resolution failure.
    let err = context
        .open(ConnectionType::Datagram, "127.0.0.1", "not-a-port")
        .unwrap_err();
    assert!(matches!(err, PlatformError::Resolve { .. }));
    assert_eq!(open_descriptor_count(), baseline);

    // Every candidate rejected by the security binder.
    let err = secured
        .open(ConnectionType::Datagram, "127.0.0.1", &port)
        .unwrap_err();
    assert!(matches!(err, PlatformError::ConnectionFailed { .. }));
    assert_eq!(open_descriptor_count(), baseline);

    // Success leaves exactly one descriptor, close releases it.
    let handle = context
        .open(ConnectionType::Datagram, "127.0.0.1", &port)
        .unwrap();
    assert_eq!(open_descriptor_count(), baseline + 1);
    context.close(handle).unwrap();
    assert_eq!(open_descriptor_count(), baseline);

    // A closed handle is skipped: the wait runs to its timeout.
    let mut set = [Some(handle)];
    let start = Instant::now();
    assert_eq!(context.wait(&mut set, 1).unwrap(), 0);
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert_eq!(set, [None]);
    assert_eq!(open_descriptor_count(), baseline);
}

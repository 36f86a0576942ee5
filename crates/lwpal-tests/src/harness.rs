//! Shared fixtures for integration tests.

use std::sync::Arc;

use lwpal_core::{ClosureDetection, Handle, PlatformConfig};
use lwpal_net::{ConnectionObserver, PlatformContext};
use parking_lot::Mutex;
use tracing::debug;

/// Initialize tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("lwpal_net=debug,lwpal_core=debug,lwpal_tests=debug")
        .with_test_writer()
        .try_init();
}

/// Creates a context with default settings and the given closure mode.
pub fn test_context(closure_detection: ClosureDetection) -> PlatformContext {
    let config = PlatformConfig {
        closure_detection,
        ..Default::default()
    };
    PlatformContext::new(config).expect("platform context")
}

/// Engine stand-in that records connection-closed upcalls.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    closed: Mutex<Vec<Handle>>,
}

impl RecordingObserver {
    /// Creates a shareable observer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handles reported closed so far, in order.
    pub fn closed(&self) -> Vec<Handle> {
        self.closed.lock().clone()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn connection_closed(&self, handle: Handle) {
        debug!(%handle, "Observer notified");
        self.closed.lock().push(handle);
    }
}

/// Number of descriptors open in this process.
///
/// Reads `/proc/self/fd`, so Linux only (0 elsewhere). Only meaningful when
/// no other test in the same binary runs concurrently.
pub fn open_descriptor_count() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

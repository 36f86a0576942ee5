//! Per-engine platform state.
//!
//! The application creates one `PlatformContext` before initializing the
//! engine, passes it to every platform call and drops it after the engine is
//! closed. The engine never owns it. It is `Send + Sync`: producer threads
//! share it through an `Arc` and call `interrupt` while the engine thread is
//! blocked in `wait`.

use std::io;
use std::sync::Arc;

use lwpal_core::{
    fill_random, ConnectionType, Handle, PlatformConfig, PlatformError, SecurityData,
    SecurityError, SecurityMode, SecurityOperation, SecurityTable, Uptime,
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::connection;
use crate::interrupt::InterruptChannel;
use crate::multiplexer::{ConnectionObserver, Multiplexer};
use crate::opener::{ConnectionOpener, SecurityBinder};

/// Platform state for one engine instance.
pub struct PlatformContext {
    config: PlatformConfig,
    interrupt: InterruptChannel,
    /// Serializes engine state between the step loop and producer threads
    engine_lock: Mutex<()>,
    /// Engine back-reference for the connection-closed upcall
    observer: RwLock<Option<Arc<dyn ConnectionObserver>>>,
    opener: ConnectionOpener,
    security: SecurityTable,
    uptime: Uptime,
}

impl PlatformContext {
    /// Creates the context and its interrupt channel.
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        let interrupt = InterruptChannel::create(config.interrupt_addr)?;
        let opener = ConnectionOpener::new(config.security_tag);
        let security = SecurityTable::new(&config.credentials);

        info!(
            closure = ?config.closure_detection,
            peers = security.len(),
            "Platform context created"
        );

        Ok(Self {
            config,
            interrupt,
            engine_lock: Mutex::new(()),
            observer: RwLock::new(None),
            opener,
            security,
            uptime: Uptime::start(),
        })
    }

    /// Binds DTLS credentials to every connection opened from now on.
    pub fn with_security_binder(mut self, binder: Arc<dyn SecurityBinder>) -> Self {
        self.opener.set_binder(binder);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Registers the engine for connection-closed upcalls.
    pub fn attach_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        *self.observer.write() = Some(observer);
        debug!("Connection observer attached");
    }

    /// Stops connection-closed upcalls.
    pub fn detach_observer(&self) {
        self.observer.write().take();
    }

    /// Opens a connection to `host:port`.
    pub fn open(
        &self,
        kind: ConnectionType,
        host: &str,
        port: &str,
    ) -> Result<Handle, PlatformError> {
        self.opener.open(kind, host, port)
    }

    /// Sends one datagram on `handle`.
    pub fn send(&self, handle: Handle, buffer: &[u8]) -> io::Result<usize> {
        connection::send(handle, buffer)
    }

    /// Receives one datagram from `handle`.
    pub fn recv(&self, handle: Handle, buffer: &mut [u8]) -> io::Result<usize> {
        connection::recv(handle, buffer)
    }

    /// Closes `handle`.
    pub fn close(&self, handle: Handle) -> io::Result<()> {
        connection::close(handle)
    }

    /// Waits for readability on `connections`; see [`Multiplexer::wait`].
    pub fn wait(
        &self,
        connections: &mut [Option<Handle>],
        timeout_secs: u32,
    ) -> Result<usize, PlatformError> {
        let observer = self.observer.read().clone();
        Multiplexer::new(&self.interrupt, self.config.closure_detection)
            .with_observer(observer)
            .wait(connections, timeout_secs)
    }

    /// Makes a blocked or upcoming `wait` return promptly.
    pub fn interrupt(&self) {
        self.interrupt.signal();
    }

    /// Answers a credential request from the engine.
    pub fn security_lookup(
        &self,
        peer: &[u8],
        mode: SecurityMode,
        operation: SecurityOperation,
    ) -> Result<SecurityData<'_>, SecurityError> {
        self.security.lookup(peer, mode, operation)
    }

    /// Locks the engine state.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.engine_lock.lock()
    }

    /// Whole seconds since the context was created.
    pub fn uptime_secs(&self) -> u32 {
        self.uptime.secs()
    }

    /// Fills `buffer` with random bytes.
    pub fn fill_random(&self, buffer: &mut [u8]) {
        fill_random(buffer);
    }

    /// Returns true while the interrupt channel is open.
    pub fn is_interruptible(&self) -> bool {
        self.interrupt.is_active()
    }

    /// Closes the interrupt channel ahead of drop. Later interrupts are
    /// no-ops and `wait` only watches connections.
    pub fn close_interrupt(&mut self) {
        self.interrupt.destroy();
    }
}

impl Drop for PlatformContext {
    fn drop(&mut self) {
        self.interrupt.destroy();
        info!(uptime = self.uptime.secs(), "Platform context closed");
    }
}

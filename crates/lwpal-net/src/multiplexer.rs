//! Interruptible readiness wait over the engine's connections.
//!
//! `wait` blocks until one of the given handles is readable, the interrupt
//! channel is signalled, or the timeout expires. The handle slice is rewritten
//! in place: positions that are not ready become `None`, ready positions keep
//! their handle. Results correlate with the input by position.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use lwpal_core::{ClosureDetection, Handle, PlatformError};
use tracing::{debug, error, trace, warn};

use crate::interrupt::InterruptChannel;
use crate::sys::{self, PollEntry};

/// Upcall into the engine for connections closed by their peer.
///
/// Only used with `ClosureDetection::Peek`. Called on the thread running
/// `wait`; implementations must not call back into `wait`.
pub trait ConnectionObserver: Send + Sync {
    /// The peer closed the connection behind `handle`.
    fn connection_closed(&self, handle: Handle);
}

/// One readiness wait over a connection set.
pub struct Multiplexer<'a> {
    interrupt: &'a InterruptChannel,
    closure: ClosureDetection,
    observer: Option<Arc<dyn ConnectionObserver>>,
}

impl<'a> Multiplexer<'a> {
    /// Creates a multiplexer watching `interrupt` in addition to connections.
    pub fn new(interrupt: &'a InterruptChannel, closure: ClosureDetection) -> Self {
        Self {
            interrupt,
            closure,
            observer: None,
        }
    }

    /// Sets the engine to notify of peer-closed connections.
    pub fn with_observer(mut self, observer: Option<Arc<dyn ConnectionObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Waits up to `timeout_secs` seconds and returns the number of ready
    /// connections. The interrupt channel is never counted.
    ///
    /// A wait interrupted by a signal returns `Ok(0)`; any other failure of
    /// the wait primitive is `PlatformError::Wait`.
    pub fn wait(
        &self,
        connections: &mut [Option<Handle>],
        timeout_secs: u32,
    ) -> Result<usize, PlatformError> {
        let mut interest: Vec<PollEntry> = Vec::with_capacity(connections.len() + 1);

        let interrupt_slot = self.interrupt.raw_fd().map(|fd| {
            interest.push(sys::read_interest(fd));
            interest.len() - 1
        });

        // Interest slot for each position; closed or empty positions get none.
        let slots: Vec<Option<usize>> = connections
            .iter()
            .map(|connection| {
                let fd = connection.as_ref()?.decode();
                if !sys::is_open(fd) {
                    trace!(fd, "Skipping closed descriptor");
                    return None;
                }
                interest.push(sys::read_interest(fd));
                Some(interest.len() - 1)
            })
            .collect();

        let timeout = Duration::from_secs(u64::from(timeout_secs));
        let ready = match sys::poll(&mut interest, timeout) {
            Ok(ready) => ready,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!("Wait interrupted by a signal");
                0
            }
            Err(e) => {
                error!(error = %e, "Readiness wait failed");
                return Err(PlatformError::Wait(e));
            }
        };

        if ready == 0 {
            connections.fill(None);
            return Ok(0);
        }

        if let Some(slot) = interrupt_slot {
            if sys::is_readable(&interest[slot]) && self.interrupt.drain_one() {
                debug!("Wait woken by interrupt");
            }
        }

        let mut count = 0;
        for (connection, slot) in connections.iter_mut().zip(slots) {
            let readable = slot.map_or(false, |slot| sys::is_readable(&interest[slot]));
            match (*connection, readable) {
                (Some(handle), true) if self.is_live(handle) => count += 1,
                _ => *connection = None,
            }
        }

        trace!(ready = count, "Wait complete");
        Ok(count)
    }

    /// Decides whether a readable handle is reported ready.
    fn is_live(&self, handle: Handle) -> bool {
        match self.closure {
            ClosureDetection::Delegated => true,
            ClosureDetection::Peek => match sys::peek(handle.decode()) {
                Ok(0) => {
                    self.notify_closed(handle);
                    false
                }
                Ok(_) => true,
                // Spurious readiness: nothing queued after all.
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    false
                }
                Err(e) => {
                    debug!(%handle, error = %e, "Peek failed, treating connection as closed");
                    self.notify_closed(handle);
                    false
                }
            },
        }
    }

    fn notify_closed(&self, handle: Handle) {
        match &self.observer {
            Some(observer) => {
                debug!(%handle, "Peer closed connection");
                observer.connection_closed(handle);
            }
            None => warn!(%handle, "Peer closed connection, no observer attached"),
        }
    }
}

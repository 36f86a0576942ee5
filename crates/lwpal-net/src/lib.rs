//! lwpal Net - Connection lifecycle and multiplexing for the protocol engine.
//!
//! Implements the native side of the platform layer:
//! - Opening connected UDP sockets, optionally bound to DTLS credentials
//! - Send, receive and close pass-throughs on handles
//! - An interruptible readiness wait over the engine's connection set
//! - The per-engine `PlatformContext`
//!
//! Unix only: descriptors are raw file descriptors and the wait is `poll(2)`.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod connection;
pub mod context;
pub mod interrupt;
pub mod multiplexer;
pub mod opener;
mod sys;

pub use context::PlatformContext;
pub use interrupt::InterruptChannel;
pub use multiplexer::{ConnectionObserver, Multiplexer};
pub use opener::{ConnectionOpener, PeerVerify, SecurityAssociation, SecurityBinder};

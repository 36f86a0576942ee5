//! lwpal Core - Platform-independent types for the LwM2M platform adaptation layer.
//!
//! This crate provides:
//! - The `Handle` codec exchanged with the protocol engine
//! - Connection and security vocabulary shared with the engine
//! - The static PSK credential table and its lookup
//! - Platform configuration loading
//! - Uptime clock and random byte shims

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod handle;
pub mod random;
pub mod security;
pub mod time;

pub use config::{ClosureDetection, CredentialEntry, PlatformConfig};
pub use handle::{Descriptor, Handle};
pub use random::fill_random;
pub use security::{
    PskCredential, SecurityData, SecurityError, SecurityMode, SecurityOperation, SecurityTable,
};
pub use time::Uptime;

use std::fmt;

use thiserror::Error;

/// Transport requested by the engine when opening a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Connectionless datagram transport (UDP).
    Datagram,
    /// Connection-oriented stream transport (TCP).
    Stream,
    /// SMS bearer.
    Sms,
    /// LoRaWAN bearer.
    LoRaWan,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionType::Datagram => "datagram",
            ConnectionType::Stream => "stream",
            ConnectionType::Sms => "sms",
            ConnectionType::LoRaWan => "lorawan",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the platform layer.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Only datagram connections can be opened
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(ConnectionType),

    /// Hostname resolution failed
    #[error("Failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Requested hostname
        host: String,
        /// Requested port
        port: String,
        /// Resolver error
        #[source]
        source: std::io::Error,
    },

    /// No resolved candidate could be connected
    #[error("Connection to {host}:{port} failed")]
    ConnectionFailed {
        /// Requested hostname
        host: String,
        /// Requested port
        port: String,
    },

    /// The interrupt channel could not be created
    #[error("Interrupt channel setup failed: {0}")]
    InterruptSetup(#[source] std::io::Error),

    /// The readiness wait primitive failed
    #[error("Readiness wait failed: {0}")]
    Wait(#[source] std::io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience result alias.
pub type Result<T, E = PlatformError> = std::result::Result<T, E>;

//! Platform configuration.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::PlatformError;

/// Default credential tag attached to secured sockets.
pub const DEFAULT_SECURITY_TAG: u32 = 16_842_753;

/// How the multiplexer treats connections closed by their peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosureDetection {
    /// Peek each readable connection; a zero-length read is reported to the
    /// engine through the connection-closed upcall and never counted ready.
    #[default]
    Peek,
    /// Report every readable connection; the engine detects closure on its
    /// next receive.
    Delegated,
}

/// One entry of the PSK credential table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialEntry {
    /// Peer identifier, usually the server URI
    pub peer: String,
    /// PSK identity
    pub identity: String,
    /// PSK secret
    pub secret: String,
}

impl CredentialEntry {
    /// Creates an entry.
    pub fn new(
        peer: impl Into<String>,
        identity: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            peer: peer.into(),
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

/// Configuration of one platform context.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    /// Closure detection mode, fixed for the whole deployment
    pub closure_detection: ClosureDetection,
    /// Loopback address the interrupt socket binds to (port 0 = ephemeral)
    pub interrupt_addr: SocketAddrV4,
    /// Credential tag attached by the security binder
    pub security_tag: u32,
    /// PSK credential table
    pub credentials: Vec<CredentialEntry>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            closure_detection: ClosureDetection::Peek,
            interrupt_addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            security_tag: DEFAULT_SECURITY_TAG,
            credentials: vec![
                CredentialEntry::new("coaps://192.0.2.2:5684", "lwpal-client", "123456"),
                CredentialEntry::new("coaps://192.0.2.2:5784", "lwpal-client", "123456"),
            ],
        }
    }
}

impl PlatformConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, PlatformError> {
        let config: Self =
            toml::from_str(content).map_err(|e| PlatformError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, PlatformError> {
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| PlatformError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if !self.interrupt_addr.ip().is_loopback() {
            return Err(PlatformError::Config(format!(
                "interrupt_addr must be a loopback address, got {}",
                self.interrupt_addr
            )));
        }
        if let Some(entry) = self.credentials.iter().find(|e| e.peer.is_empty()) {
            return Err(PlatformError::Config(format!(
                "credential for identity {:?} has an empty peer",
                entry.identity
            )));
        }
        Ok(())
    }
}

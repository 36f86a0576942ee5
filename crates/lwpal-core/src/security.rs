//! Credential lookup for secured sessions.
//!
//! The engine asks for credential material while setting up a DTLS session
//! with a peer. Only pre-shared keys are served, from a table fixed at
//! construction; every other security mode answers `NotImplemented`.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::CredentialEntry;

/// Security mode requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityMode {
    /// No transport security.
    None,
    /// Pre-shared key (identity and secret).
    PreSharedKey,
    /// Raw public key.
    RawPublicKey,
    /// X.509 certificate.
    Certificate,
    /// Certificate provisioned through EST.
    CertificateWithEst,
    /// OSCORE object security.
    Oscore,
}

/// Operation the engine performs on security data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityOperation {
    /// Fetch credential material for a peer.
    Read,
    /// Release what a previous read handed out.
    Free,
    /// Store new credential material.
    Create,
    /// Delete stored credential material.
    Delete,
}

/// Lookup failures, reported to the engine as CoAP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// The peer is not in the credential table
    #[error("No credentials for peer")]
    NotFound,

    /// The requested mode or operation is not served
    #[error("Security mode or operation not implemented")]
    NotImplemented,
}

impl SecurityError {
    /// CoAP code (class << 5 | detail) returned to the engine.
    pub const fn coap_code(self) -> u8 {
        match self {
            // 4.04 Not Found
            SecurityError::NotFound => 0x84,
            // 5.01 Not Implemented
            SecurityError::NotImplemented => 0xA1,
        }
    }
}

/// PSK identity and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct PskCredential {
    /// PSK identity presented to the peer
    pub identity: Vec<u8>,
    /// Shared secret
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for PskCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PskCredential")
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Successful lookup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityData<'a> {
    /// Credentials for a `Read` of a known peer.
    Psk(&'a PskCredential),
    /// A `Free` completed; nothing was held.
    Released,
}

#[derive(Debug)]
struct SecurityRecord {
    peer: Vec<u8>,
    credential: PskCredential,
}

/// Read-only peer-to-credential table.
///
/// Cloning shares the same records; the table is never mutated after
/// construction and can be queried from any thread.
#[derive(Debug, Clone)]
pub struct SecurityTable {
    records: Arc<[SecurityRecord]>,
}

impl Default for SecurityTable {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl SecurityTable {
    /// Builds a table from configured entries.
    pub fn new(entries: &[CredentialEntry]) -> Self {
        let records: Vec<SecurityRecord> = entries
            .iter()
            .map(|entry| SecurityRecord {
                peer: entry.peer.as_bytes().to_vec(),
                credential: PskCredential {
                    identity: entry.identity.as_bytes().to_vec(),
                    secret: entry.secret.as_bytes().to_vec(),
                },
            })
            .collect();
        Self {
            records: records.into(),
        }
    }

    /// Returns the number of known peers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no peer is known.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Answers a security data request from the engine.
    ///
    /// The peer identifier is compared byte for byte, so `coaps://host:5684`
    /// and `coaps://host:5684/` are different peers.
    pub fn lookup(
        &self,
        peer: &[u8],
        mode: SecurityMode,
        operation: SecurityOperation,
    ) -> Result<SecurityData<'_>, SecurityError> {
        match operation {
            SecurityOperation::Read => match mode {
                SecurityMode::PreSharedKey => {
                    let record = self
                        .records
                        .iter()
                        .find(|record| record.peer == peer)
                        .ok_or(SecurityError::NotFound)?;
                    debug!(peer = %String::from_utf8_lossy(peer), "PSK credentials found");
                    Ok(SecurityData::Psk(&record.credential))
                }
                _ => Err(SecurityError::NotImplemented),
            },
            SecurityOperation::Free => Ok(SecurityData::Released),
            _ => Err(SecurityError::NotImplemented),
        }
    }
}

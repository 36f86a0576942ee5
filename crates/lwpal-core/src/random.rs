//! Random bytes for the engine (message IDs, tokens).
//!
//! Not a key-generation source: DTLS key material comes from the security
//! provider, never from here.

use rand::RngCore;

/// Fills `buffer` with random bytes.
pub fn fill_random(buffer: &mut [u8]) {
    rand::thread_rng().fill_bytes(buffer);
}

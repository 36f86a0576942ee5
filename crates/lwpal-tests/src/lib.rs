//! Integration tests for lwpal.
//!
//! This crate provides:
//! - Loopback UDP peers standing in for LwM2M servers
//! - A recording engine observer for connection-closed upcalls
//! - A descriptor-count probe for leak checks

pub mod harness;
pub mod peer;

pub use harness::{init_tracing, open_descriptor_count, test_context, RecordingObserver};
pub use peer::LoopbackPeer;

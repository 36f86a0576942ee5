//! Opaque connection handles.
//!
//! The engine never sees native descriptors. Each open connection is exchanged
//! as a `Handle` whose raw value is the descriptor plus one, so that descriptor
//! `0` stays distinct from the reserved "no handle" value `0`. The sentinel is
//! expressed as `Option::<Handle>::None`, which shares the zero niche.

use std::fmt;
use std::num::NonZeroU32;

/// Native socket descriptor.
pub type Descriptor = i32;

/// Offset added to a descriptor before it becomes a handle value.
const HANDLE_OFFSET: u32 = 1;

/// Opaque handle for one open connection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(NonZeroU32);

impl Handle {
    /// Encodes a descriptor returned by a successful open.
    ///
    /// Descriptors must be non-negative. A negative descriptor is a caller
    /// error: the resulting handle is unspecified but never the sentinel.
    pub fn encode(descriptor: Descriptor) -> Self {
        debug_assert!(descriptor >= 0, "negative descriptor {descriptor}");
        let raw = (descriptor as u32).wrapping_add(HANDLE_OFFSET);
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MAX))
    }

    /// Recovers the native descriptor.
    pub fn decode(self) -> Descriptor {
        (self.0.get() - HANDLE_OFFSET) as Descriptor
    }

    /// Returns the raw handle value handed to the engine.
    pub const fn as_raw(self) -> u32 {
        self.0.get()
    }

    /// Rebuilds a handle from a raw value; `0` is the sentinel.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(fd={})", self.decode())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_inverts_encode() {
        for fd in [0, 1, 2, 3, 63, 1024, 65_535, i32::MAX] {
            let handle = Handle::encode(fd);
            assert_eq!(handle.decode(), fd);
            assert_ne!(handle.as_raw(), 0);
        }
    }

    #[test]
    fn test_zero_descriptor_is_not_sentinel() {
        let handle = Handle::encode(0);
        assert_eq!(handle.as_raw(), 1);
        assert_eq!(Handle::from_raw(handle.as_raw()), Some(handle));
    }

    #[test]
    fn test_raw_zero_is_sentinel() {
        assert_eq!(Handle::from_raw(0), None);
    }

    #[test]
    fn test_sentinel_uses_niche() {
        assert_eq!(
            std::mem::size_of::<Option<Handle>>(),
            std::mem::size_of::<u32>()
        );
    }
}

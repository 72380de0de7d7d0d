//! Optimistic concurrency control primitives
//!
//! TigerStyle: Explicit version type, explicit outcome of every write.
//!
//! The entity index is the one record with many writers. A writer reads the
//! record with its version, builds the new value locally, and commits only if
//! the stored version is still the one it read. A losing writer re-runs the
//! whole read-modify-write.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-key write counter
///
/// `Version::INITIAL` is a key nobody has written; each successful write
/// moves it forward by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    pub const INITIAL: Self = Version(0);

    pub const fn new(writes: u64) -> Self {
        Version(writes)
    }

    /// Version after one more write
    pub fn increment(&self) -> Self {
        Version(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Outcome of a compare-and-swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccResult<T> {
    Success(T),
    /// Someone else committed after `read_version`
    VersionConflict {
        read_version: Version,
        current_version: Version,
    },
}

impl<T> OccResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, OccResult::Success(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, OccResult::VersionConflict { .. })
    }
}

/// A value and the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: Version) -> Self {
        Versioned { value, version }
    }

    /// Value of a key that has never been written
    pub fn initial(value: T) -> Self {
        Versioned::new(value, Version::INITIAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_moves_forward() {
        let v1 = Version::INITIAL.increment();
        assert_eq!(v1, Version::new(1));
        assert!(v1 > Version::INITIAL);
        assert_eq!(v1.to_string(), "v1");
    }

    #[test]
    fn test_conflict_is_not_success() {
        let conflict: OccResult<()> = OccResult::VersionConflict {
            read_version: Version::new(1),
            current_version: Version::new(2),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_success());
        assert!(OccResult::Success(()).is_success());
    }

    #[test]
    fn test_unwritten_key_reads_initial() {
        let read = Versioned::initial(None::<Vec<u8>>);
        assert_eq!(read.version, Version::INITIAL);
        assert!(read.value.is_none());
    }
}

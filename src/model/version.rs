//! Version - signed 64-bit document version
//!
//! - Magnitude encodes causal order (higher = later)
//! - Sign encodes liveness: negative iff the document is tombstoned
//! - Magnitude is always what gets compared; the sign is read separately

use std::fmt;

use serde::{Deserialize, Serialize};

/// A signed document version.
///
/// `Version(0)` never appears on a stored entry; the clock starts at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Expected version meaning "the document must not currently exist".
    pub const MUST_NOT_EXIST: Version = Version(-1);

    /// Largest magnitude with both a live and a tombstone encoding.
    /// `i64::MIN` has magnitude 2^63 and no live counterpart.
    pub const MAX_MAGNITUDE: u64 = i64::MAX as u64;

    /// Wraps a raw signed value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// A live version with the given magnitude.
    #[inline]
    pub fn live(magnitude: u64) -> Self {
        debug_assert!(magnitude <= Self::MAX_MAGNITUDE);
        Self(magnitude as i64)
    }

    /// A tombstone version with the given magnitude.
    #[inline]
    pub fn tombstone(magnitude: u64) -> Self {
        debug_assert!(magnitude <= Self::MAX_MAGNITUDE);
        Self(-(magnitude as i64))
    }

    /// Returns the raw signed value.
    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Returns the ordering magnitude.
    #[inline]
    pub fn magnitude(&self) -> u64 {
        self.0.unsigned_abs()
    }

    /// Returns true if this version marks a deleted document.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.0 < 0
    }

    /// True if the magnitude can be stored both live and tombstoned:
    /// neither `0` nor `i64::MIN`.
    #[inline]
    pub fn is_assignable(&self) -> bool {
        self.0 != 0 && self.0 != i64::MIN
    }

    /// True if `self` orders strictly after `other`.
    #[inline]
    pub fn supersedes(&self, other: Version) -> bool {
        self.magnitude() > other.magnitude()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

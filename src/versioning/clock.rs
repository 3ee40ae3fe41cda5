//! VersionClock - version assignment for locally originated operations
//!
//! - Strictly increasing across all callers (CAS loop, no lock)
//! - Time-seeded: `unix_millis << 20` keeps versions from different
//!   process lifetimes ordered even when nothing was replayed
//! - `observe` raises the floor for leader-assigned and replayed versions,
//!   so a local version always supersedes anything already stored
//! - Never issues past [`Version::MAX_MAGNITUDE`]; once that is reached the
//!   clock is exhausted and `next` returns `None`

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::model::Version;

const TIME_SHIFT: u32 = 20;

#[derive(Debug)]
pub struct VersionClock {
    last: AtomicU64,
    time_seeded: bool,
}

impl VersionClock {
    /// A clock whose versions never fall behind wall-clock time.
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
            time_seeded: true,
        }
    }

    /// A purely logical clock starting after `last`. Used by tests and tools
    /// that need small, predictable numbers.
    pub fn logical(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
            time_seeded: false,
        }
    }

    /// Issues the next version (always live; callers negate for deletes).
    ///
    /// `None` once the last representable magnitude was issued or observed.
    pub fn next(&self) -> Option<Version> {
        let floor = if self.time_seeded { time_floor() } else { 0 };
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            if current >= Version::MAX_MAGNITUDE {
                return None;
            }
            let candidate = (current + 1).max(floor).min(Version::MAX_MAGNITUDE);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(Version::live(candidate)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Records a version seen from elsewhere.
    pub fn observe(&self, version: Version) {
        self.last.fetch_max(version.magnitude(), Ordering::AcqRel);
    }

    /// The highest magnitude issued or observed so far.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

fn time_floor() -> u64 {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    millis.saturating_mul(1 << TIME_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_logical_clock_counts_from_start() {
        let clock = VersionClock::logical(10);
        assert_eq!(clock.next(), Some(Version::live(11)));
        assert_eq!(clock.next(), Some(Version::live(12)));
    }

    #[test]
    fn test_observe_raises_floor() {
        let clock = VersionClock::logical(0);
        clock.observe(Version::tombstone(500));
        assert_eq!(clock.next(), Some(Version::live(501)));

        // Observing something older never lowers it.
        clock.observe(Version::live(3));
        assert_eq!(clock.next(), Some(Version::live(502)));
    }

    #[test]
    fn test_time_seeded_versions_are_large_and_increasing() {
        let clock = VersionClock::new();
        let a = clock.next().unwrap();
        let b = clock.next().unwrap();
        assert!(a.magnitude() > 1 << TIME_SHIFT);
        assert!(b.supersedes(a));
    }

    #[test]
    fn test_exhausted_clock_issues_nothing() {
        let clock = VersionClock::logical(Version::MAX_MAGNITUDE - 1);
        assert_eq!(clock.next(), Some(Version::new(i64::MAX)));
        assert_eq!(clock.next(), None);

        let clock = VersionClock::new();
        clock.observe(Version::new(i64::MAX));
        assert_eq!(clock.next(), None);
        assert_eq!(clock.last(), Version::MAX_MAGNITUDE);
    }

    #[test]
    fn test_concurrent_next_never_repeats() {
        let clock = Arc::new(VersionClock::logical(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                thread::spawn(move || (0..1000).map(|_| clock.next().unwrap().magnitude()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(clock.last(), 4000);
    }
}

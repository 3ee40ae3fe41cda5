//! Version assignment and the per-id version map.

mod clock;
mod map;

pub use clock::VersionClock;
pub use map::{VersionEntry, VersionMap};

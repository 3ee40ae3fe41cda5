//! Commits: generations, snapshots and the coordinator that installs them.

mod coordinator;
mod errors;
mod snapshot;

pub use coordinator::{CommitCoordinator, CommitOutcome};
pub use errors::{CommitError, CommitResult};
pub use snapshot::{CommittedSnapshot, SnapshotCell};

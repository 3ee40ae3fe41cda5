//! Observability: typed events, counters and tracing setup.
//!
//! Observability is read-only; nothing here feeds back into the apply or
//! commit paths.
//!
//! ```ignore
//! use rtstore::observability::{Event, MetricsRegistry};
//!
//! tracing::info!(event = %Event::CommitInstalled, generation = 3, "commit installed");
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_commits(true);
//! ```

mod events;
mod metrics;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use events::Event;
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "RTSTORE_LOG";

static INIT: Once = Once::new();

/// Installs a JSON tracing subscriber filtered by `RTSTORE_LOG`.
///
/// Defaults to `rtstore=info`. Idempotent.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("rtstore=info"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .with_writer(std::io::stderr)
            .init();
    });
}

//! Concurrency control for the apply path
//!
//! Every mutation goes through [`ConcurrencyController::apply`], which
//! serializes operations per document id, enforces the mode's version
//! rules and logs before publishing.

mod controller;
mod errors;
mod locks;

pub use controller::ConcurrencyController;
pub use errors::{ApplyError, ApplyResult};
pub use locks::IdLocks;

//! Cooperative cancellation for pipeline runs.
//!
//! One [`CancellationToken`] is shared by every step of a run. Backoff waits,
//! step bodies and progress reporters all observe it.

mod token;

pub use token::{CancelCallback, CancellationToken};

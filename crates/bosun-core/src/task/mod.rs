//! Batch task model.
//!
//! A [`BatchTask`] records one long-running operation's progress, warnings,
//! errors, cancellation, and completion through observable properties
//! declared in a shared [`TaskProperties`] set.

mod core;
mod properties;

pub use self::core::{BatchTask, TaskId};
pub use properties::TaskProperties;

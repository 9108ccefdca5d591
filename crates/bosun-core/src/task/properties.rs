//! Descriptor set for batch task state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::observable::Property;

/// The descriptor set backing every [`BatchTask`](super::BatchTask)'s
/// observable state.
///
/// Construct exactly one set per process (or per test harness) and share it
/// through an `Arc`: tasks, watchers, and the aggregator all compare property
/// identity, and identities only line up for tasks built from the same set.
/// There is no ambient global; whoever wires the process together owns the
/// set and hands out references.
#[derive(Debug)]
pub struct TaskProperties {
    /// Steps finished so far. Monotone non-decreasing while the task is
    /// incomplete; writing a smaller value is a programmer error.
    pub current_step: Property<u32>,
    /// Latest human-readable status line.
    pub status: Property<String>,
    /// Every status line appended so far, oldest first. Never shrinks.
    pub status_history: Property<Vec<String>>,
    /// Overall fraction complete in `[0, 1]`, when derivable.
    pub percent_complete: Property<Option<f64>>,
    /// Sticky flag recording that at least one item failed without stopping
    /// the batch.
    pub is_warning: Property<bool>,
    /// Sticky flag recording a batch-fatal failure.
    pub is_error: Property<bool>,
    /// Cooperative cancellation request flag, set from outside the worker.
    pub is_canceled: Property<bool>,
    /// Terminal flag. Transitions false to true exactly once and never
    /// reverts.
    pub is_complete: Property<bool>,
    /// Wall-clock stamp taken when `is_complete` first became true.
    pub time_completed: Property<Option<DateTime<Utc>>>,
}

impl TaskProperties {
    /// Builds a fresh descriptor set with new identities for every property.
    pub fn new() -> Self {
        Self {
            current_step: Property::new("current_step", 0).with_on_changed(Arc::new(
                |_store, old, new| {
                    debug_assert!(
                        new >= old,
                        "current_step moved backwards (from {old} to {new})"
                    );
                },
            )),
            status: Property::new("status", String::new()),
            status_history: Property::new("status_history", Vec::new()),
            percent_complete: Property::new("percent_complete", None),
            is_warning: Property::new("is_warning", false),
            is_error: Property::new("is_error", false),
            is_canceled: Property::new("is_canceled", false),
            is_complete: Property::new("is_complete", false),
            time_completed: Property::new("time_completed", None),
        }
    }
}

impl Default for TaskProperties {
    fn default() -> Self {
        Self::new()
    }
}

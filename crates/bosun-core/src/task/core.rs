//! Core batch task type.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use super::properties::TaskProperties;
use crate::error::Error;
use crate::observable::{DEFAULT_CHANGE_CAPACITY, PropertyChange, PropertyStore};
use crate::sync::IgnoreRwLock as _;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl Default for TaskId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

/// One logical batch operation.
///
/// Construction fixes the identity, name, expected step count, and whether
/// the operation honors cancellation requests. Everything that changes while
/// the operation runs lives in an internal [`PropertyStore`] and is read
/// through accessors or observed through [`BatchTask::subscribe`].
///
/// Exactly one worker mutates a task's progress and outcome; any number of
/// readers observe it concurrently. The one mutation allowed from outside
/// the worker is [`BatchTask::request_cancel`]. Once complete, a task's
/// content no longer changes, but it remains readable and observable.
#[derive(Debug)]
pub struct BatchTask {
    id: TaskId,
    name: String,
    total_steps: Option<u32>,
    supports_cancel: bool,
    properties: Arc<TaskProperties>,
    store: RwLock<PropertyStore>,
}

impl BatchTask {
    /// Creates a task with the default change feed capacity.
    pub fn new(
        properties: Arc<TaskProperties>,
        name: String,
        total_steps: Option<u32>,
        supports_cancel: bool,
    ) -> Self {
        Self::with_change_capacity(
            properties,
            name,
            total_steps,
            supports_cancel,
            DEFAULT_CHANGE_CAPACITY,
        )
    }

    /// Creates a task whose change feed buffers `change_capacity`
    /// notifications per subscriber.
    ///
    /// A step count of zero carries no progress information and is treated
    /// as unknown.
    pub fn with_change_capacity(
        properties: Arc<TaskProperties>,
        name: String,
        total_steps: Option<u32>,
        supports_cancel: bool,
        change_capacity: usize,
    ) -> Self {
        Self {
            id: TaskId::default(),
            name,
            total_steps: total_steps.filter(|&total| total > 0),
            supports_cancel,
            properties,
            store: RwLock::new(PropertyStore::new(change_capacity)),
        }
    }

    /// Unique identifier of this task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Human-readable operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected number of coarse steps, when known.
    pub fn total_steps(&self) -> Option<u32> {
        self.total_steps
    }

    /// Whether [`BatchTask::request_cancel`] has any effect on this task.
    pub fn supports_cancel(&self) -> bool {
        self.supports_cancel
    }

    /// The descriptor set this task's properties were declared in.
    pub fn properties(&self) -> &TaskProperties {
        &self.properties
    }

    /// Subscribes to this task's property change feed.
    ///
    /// Changes arrive in mutation order. A subscriber that lags behind the
    /// feed should re-read current state through the accessors.
    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChange> {
        self.store.read_ignore_poison().subscribe()
    }

    /// Steps finished so far.
    pub fn current_step(&self) -> u32 {
        self.store
            .read_ignore_poison()
            .get(&self.properties.current_step)
    }

    /// Latest status line.
    pub fn status(&self) -> String {
        self.store.read_ignore_poison().get(&self.properties.status)
    }

    /// Every status line recorded so far, oldest first.
    pub fn status_history(&self) -> Vec<String> {
        self.store
            .read_ignore_poison()
            .get(&self.properties.status_history)
    }

    /// Overall fraction complete in `[0, 1]`, when the task reports one.
    pub fn percent_complete(&self) -> Option<f64> {
        self.store
            .read_ignore_poison()
            .get(&self.properties.percent_complete)
    }

    /// Whether any item failed without stopping the batch.
    pub fn is_warning(&self) -> bool {
        self.store
            .read_ignore_poison()
            .get(&self.properties.is_warning)
    }

    /// Whether the batch hit a fatal failure.
    pub fn is_error(&self) -> bool {
        self.store
            .read_ignore_poison()
            .get(&self.properties.is_error)
    }

    /// Whether cancellation has been requested. Workers poll this between
    /// items.
    pub fn is_canceled(&self) -> bool {
        self.store
            .read_ignore_poison()
            .get(&self.properties.is_canceled)
    }

    /// Whether the task reached its terminal transition.
    pub fn is_complete(&self) -> bool {
        self.store
            .read_ignore_poison()
            .get(&self.properties.is_complete)
    }

    /// When the task completed, once it has.
    pub fn time_completed(&self) -> Option<DateTime<Utc>> {
        self.store
            .read_ignore_poison()
            .get(&self.properties.time_completed)
    }

    /// Records a finished step: sets the step counter, appends `message` to
    /// the history, makes it the current status line, and recomputes the
    /// overall percentage when the step count is known.
    ///
    /// # Panics
    /// In debug builds, panics when `step` is lower than the previous value
    /// or when the task is already complete.
    pub fn set_progress(&self, step: u32, message: String) {
        let mut store = self.store.write_ignore_poison();
        let completed = store.get(&self.properties.is_complete);
        debug_assert!(!completed, "set_progress called on a completed task");
        if completed {
            return;
        }

        store.set(&self.properties.current_step, step);
        Self::record_status(&mut store, &self.properties, message);
        if let Some(total) = self.total_steps {
            let percent = f64::from(step) / f64::from(total);
            store.set(&self.properties.percent_complete, Some(percent));
        }
    }

    /// Overrides the percentage with progress partway through the current
    /// step, for finer feedback while one coarse step pages through many
    /// sub-items. Appends nothing to the history. Has no effect when the
    /// step count is unknown.
    ///
    /// # Panics
    /// In debug builds, panics when `fraction` is outside `[0, 1)` or the
    /// task is already complete.
    pub fn set_progress_for_current_step(&self, fraction: f64) {
        debug_assert!(
            (0.0..1.0).contains(&fraction),
            "fraction must be in [0, 1), got {fraction}"
        );
        let Some(total) = self.total_steps else {
            return;
        };

        let mut store = self.store.write_ignore_poison();
        let completed = store.get(&self.properties.is_complete);
        debug_assert!(
            !completed,
            "set_progress_for_current_step called on a completed task"
        );
        if completed {
            return;
        }

        let step = store.get(&self.properties.current_step);
        let percent = (f64::from(step) + fraction) / f64::from(total);
        store.set(&self.properties.percent_complete, Some(percent));
    }

    /// Records a non-fatal item failure: appends `message` to the history
    /// and sets the sticky warning flag. The batch is expected to keep
    /// processing the remaining items.
    pub fn set_warning(&self, message: String) {
        let mut store = self.store.write_ignore_poison();
        let completed = store.get(&self.properties.is_complete);
        debug_assert!(!completed, "set_warning called on a completed task");
        if completed {
            return;
        }

        Self::record_status(&mut store, &self.properties, message);
        store.set(&self.properties.is_warning, true);
    }

    /// Like [`BatchTask::set_warning`], with the failure's error appended to
    /// the recorded message.
    pub fn set_warning_with_error(&self, message: String, error: &Error) {
        self.set_warning(format!("{message}: {error}"));
    }

    /// Records a batch-fatal failure: appends `message` to the history and
    /// sets the sticky error flag. The caller stops processing and still
    /// calls [`BatchTask::set_complete`].
    pub fn set_error(&self, message: String) {
        let mut store = self.store.write_ignore_poison();
        let completed = store.get(&self.properties.is_complete);
        debug_assert!(!completed, "set_error called on a completed task");
        if completed {
            return;
        }

        Self::record_status(&mut store, &self.properties, message);
        store.set(&self.properties.is_error, true);
    }

    /// Like [`BatchTask::set_error`], with the failure's error appended to
    /// the recorded message.
    pub fn set_error_with_source(&self, message: String, error: &Error) {
        self.set_error(format!("{message}: {error}"));
    }

    /// The universal terminal transition: appends the final message, sets
    /// the completion flag, and stamps the completion time.
    ///
    /// Safe to call after cancellation or an error, and safe to call more
    /// than once: the first call wins, later calls change nothing.
    pub fn set_complete(&self, message: String) {
        let mut store = self.store.write_ignore_poison();
        if store.get(&self.properties.is_complete) {
            return;
        }

        Self::record_status(&mut store, &self.properties, message);
        store.set(&self.properties.is_complete, true);
        store.set(&self.properties.time_completed, Some(Utc::now()));
    }

    /// Requests cooperative cancellation and reports whether the flag was
    /// newly set.
    ///
    /// Callable from any thread. The worker alone decides when to honor the
    /// request; it polls [`BatchTask::is_canceled`] between items, stops,
    /// and still completes the task. Requests against tasks that do not
    /// support cancellation, or that already completed, are ignored.
    pub fn request_cancel(&self) -> bool {
        if !self.supports_cancel {
            warn!(
                "Cancellation requested for \"{}\", which does not support it",
                self.name
            );
            return false;
        }

        let mut store = self.store.write_ignore_poison();
        if store.get(&self.properties.is_complete) {
            return false;
        }
        store.set(&self.properties.is_canceled, true)
    }

    fn record_status(store: &mut PropertyStore, properties: &TaskProperties, message: String) {
        let mut history = store.get(&properties.status_history);
        history.push(message.clone());
        store.set(&properties.status_history, history);
        store.set(&properties.status, message);
    }
}

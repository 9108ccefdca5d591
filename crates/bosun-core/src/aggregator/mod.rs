//! Status aggregation service.
//!
//! Subscribes to a [`StatusBus`], tracks every published task in a
//! newest-first live list, folds the incomplete entries into one
//! [`CombinedStatus`], pushes that to a [`StatusSink`] whenever it changes,
//! and evicts completed entries once a retention window passes. Pinned
//! entries are immune to eviction, and any entry can be dismissed outright.

mod combined;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::spawn;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, interval};
use tracing::{debug, error, info, warn};

use crate::bus::{MessageLevel, StatusBus, StatusEvent};
use crate::config::StatusConfig;
use crate::observable::{PropertyChange, PropertyKey};
use crate::sync::{IgnoreLock as _, IgnoreRwLock as _};
use crate::task::{BatchTask, TaskId};

pub use combined::{CombinedStatus, ProgressState, StatusSink};

/// One tracked task plus its presentation state.
struct LiveEntry {
    task: Arc<BatchTask>,
    pinned: bool,
    /// When the aggregator observed the task complete. Eviction age is
    /// measured from here.
    completed_at: Option<Instant>,
}

/// State shared between the handle, the listener, the watchers, and the
/// sweeper.
struct Shared {
    entries: RwLock<Vec<LiveEntry>>,
    sink: Arc<dyn StatusSink>,
    /// Last status handed to the sink. Guards against duplicate pushes and
    /// orders concurrent recomputations.
    last_pushed: Mutex<CombinedStatus>,
    /// Whether a sweeper task is currently alive.
    sweeper_running: AtomicBool,
    retention: Duration,
    sweep_interval: Duration,
}

impl Shared {
    /// Starts tracking a newly published task.
    fn track(self: &Arc<Self>, task: Arc<BatchTask>) {
        let task_id = task.id();
        let completion_key = task.properties().is_complete.key();
        // Subscribing before the completion check means a completion can be
        // observed twice, but never missed.
        let changes = task.subscribe();
        let completed_at = task.is_complete().then(Instant::now);

        {
            let mut entries = self.entries.write_ignore_poison();
            if entries.iter().any(|entry| entry.task.id() == task_id) {
                debug!("Task {task_id:?} is already tracked, ignoring repeat publication");
                return;
            }
            entries.insert(
                0,
                LiveEntry {
                    task,
                    pinned: false,
                    completed_at,
                },
            );
        }

        self.ensure_sweeper();
        spawn(watch_task(Arc::clone(self), task_id, completion_key, changes));
        self.recompute_and_push();
    }

    /// Spawns a sweeper unless one is already alive.
    ///
    /// Called after an entry lands in the list. The sweeper parks its flag
    /// under the entries lock before exiting, so observing `false` here
    /// means the exiting sweeper already saw a list without our entry and
    /// a fresh sweeper is needed.
    fn ensure_sweeper(self: &Arc<Self>) {
        if self
            .sweeper_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            spawn(sweep_loop(Arc::clone(self)));
        }
    }

    fn contains(&self, task_id: TaskId) -> bool {
        self.entries
            .read_ignore_poison()
            .iter()
            .any(|entry| entry.task.id() == task_id)
    }

    /// Records when a task's completion was first observed.
    fn mark_completed(&self, task_id: TaskId) {
        let mut entries = self.entries.write_ignore_poison();
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.task.id() == task_id)
            && entry.completed_at.is_none()
        {
            entry.completed_at = Some(Instant::now());
        }
    }

    /// Re-reads task state after notifications were lost.
    fn resync(&self) {
        {
            let mut entries = self.entries.write_ignore_poison();
            for entry in entries.iter_mut() {
                if entry.completed_at.is_none() && entry.task.is_complete() {
                    entry.completed_at = Some(Instant::now());
                }
            }
        }
        self.recompute_and_push();
    }

    /// Folds the live list and pushes the result if it differs from the
    /// last push.
    fn recompute_and_push(&self) {
        // Folding under the push lock keeps a stale status from landing
        // after a fresher one.
        let mut last = self.last_pushed.lock_ignore_poison();
        let combined = {
            let entries = self.entries.read_ignore_poison();
            CombinedStatus::from_tasks(entries.iter().map(|entry| &entry.task))
        };
        if *last == combined {
            return;
        }
        self.sink.set_progress(combined.state, combined.percent);
        self.sink.set_title_suffix(combined.title_suffix().as_deref());
        *last = combined;
    }

    /// Evicts entries whose completion aged past the retention window.
    ///
    /// Returns `true` when the list is empty and the sweeper should exit.
    fn sweep(&self) -> bool {
        let now = Instant::now();
        let removed;
        let park;
        {
            let mut entries = self.entries.write_ignore_poison();
            let before = entries.len();
            entries.retain(|entry| {
                if entry.pinned {
                    return true;
                }
                entry
                    .completed_at
                    .is_none_or(|completed_at| now.duration_since(completed_at) <= self.retention)
            });
            removed = entries.len() != before;
            park = entries.is_empty();
            if park {
                // Parking is decided under the entries lock, so a
                // publication cannot slip between the emptiness check and
                // the flag store.
                self.sweeper_running.store(false, Ordering::Release);
            }
        }
        if removed {
            self.recompute_and_push();
        }
        park
    }
}

/// Handle to the status aggregation service.
///
/// Cloning is cheap and every clone manipulates the same live list.
/// Dropping the handles does not stop the service; it runs until the bus
/// closes.
#[derive(Clone)]
pub struct StatusAggregator {
    shared: Arc<Shared>,
}

impl StatusAggregator {
    /// Subscribes to `bus` and starts the aggregation service.
    ///
    /// Events published before this call are not observed. Must be called
    /// from within a Tokio runtime.
    pub fn spawn(bus: &StatusBus, sink: Arc<dyn StatusSink>, config: &StatusConfig) -> Self {
        let shared = Arc::new(Shared {
            entries: RwLock::new(Vec::new()),
            sink,
            last_pushed: Mutex::new(CombinedStatus::idle()),
            sweeper_running: AtomicBool::new(false),
            retention: config.aggregator.retention(),
            sweep_interval: config.aggregator.sweep_interval(),
        });
        spawn(listen(Arc::clone(&shared), bus.subscribe()));
        Self { shared }
    }

    /// Newest-first snapshot of every task in the live list.
    pub fn tasks(&self) -> Vec<Arc<BatchTask>> {
        self.shared
            .entries
            .read_ignore_poison()
            .iter()
            .map(|entry| Arc::clone(&entry.task))
            .collect()
    }

    /// Folds the current live list into one combined status.
    pub fn combined(&self) -> CombinedStatus {
        let entries = self.shared.entries.read_ignore_poison();
        CombinedStatus::from_tasks(entries.iter().map(|entry| &entry.task))
    }

    /// Pins a task so eviction leaves it in place while someone inspects it.
    ///
    /// Returns `false` when the task is no longer tracked.
    pub fn pin(&self, task_id: TaskId) -> bool {
        self.set_pinned(task_id, true)
    }

    /// Releases a pin placed by [`StatusAggregator::pin`], making the task
    /// evictable again once its retention window passes.
    pub fn unpin(&self, task_id: TaskId) -> bool {
        self.set_pinned(task_id, false)
    }

    /// Removes a task from the live list regardless of its state or age.
    ///
    /// Returns `false` when the task was not tracked. The task itself is
    /// untouched; whoever holds it can keep reading it.
    pub fn dismiss(&self, task_id: TaskId) -> bool {
        let removed;
        {
            let mut entries = self.shared.entries.write_ignore_poison();
            let before = entries.len();
            entries.retain(|entry| entry.task.id() != task_id);
            removed = entries.len() != before;
        }
        if removed {
            self.shared.recompute_and_push();
        }
        removed
    }

    fn set_pinned(&self, task_id: TaskId, pinned: bool) -> bool {
        let mut entries = self.shared.entries.write_ignore_poison();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.task.id() == task_id) {
            entry.pinned = pinned;
            true
        } else {
            false
        }
    }
}

/// Listener loop for bus events.
///
/// Tasks published while the listener lags are lost along with the missed
/// events; tracked tasks resynchronize from current state instead.
async fn listen(shared: Arc<Shared>, mut events: Receiver<StatusEvent>) {
    loop {
        match events.recv().await {
            Ok(StatusEvent::TaskStarted { task }) => shared.track(task),
            Ok(StatusEvent::Notice { level, message }) => {
                match level {
                    MessageLevel::Warning => warn!("{message}"),
                    MessageLevel::Error => error!("{message}"),
                    MessageLevel::Info | MessageLevel::Success => info!("{message}"),
                }
                shared.sink.notice(level, &message);
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Status listener lagged behind the bus by {missed} events");
                shared.resync();
            }
            Err(RecvError::Closed) => {
                debug!("Status bus closed, aggregation service stopping");
                break;
            }
        }
    }
}

/// Watcher loop for one tracked task's change feed.
///
/// Changes only trigger recomputation; all state is re-read from the task,
/// so losing notifications to lag is recoverable.
async fn watch_task(
    shared: Arc<Shared>,
    task_id: TaskId,
    completion_key: PropertyKey,
    mut changes: Receiver<PropertyChange>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if !shared.contains(task_id) {
                    break;
                }
                if change.key == completion_key {
                    shared.mark_completed(task_id);
                }
                shared.recompute_and_push();
            }
            Err(RecvError::Lagged(missed)) => {
                debug!("Watcher for task {task_id:?} lagged by {missed} changes");
                if !shared.contains(task_id) {
                    break;
                }
                shared.resync();
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Sweeper loop, alive only while the live list is non-empty.
async fn sweep_loop(shared: Arc<Shared>) {
    let mut ticker = interval(shared.sweep_interval);
    loop {
        ticker.tick().await;
        if shared.sweep() {
            debug!("Live list is empty, status sweeper parked");
            break;
        }
    }
}

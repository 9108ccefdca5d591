//! Broadcast bus carrying task handles and bare notices.
//!
//! Publishing is fire-and-forget: it never blocks, never back-pressures, and
//! is callable from any thread or task. Each subscriber consumes its own
//! buffered feed; one that falls behind observes a lag error and must pick
//! back up from current state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::Error;
use crate::task::BatchTask;

/// Severity of a bare notice published without a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Informational message
    Info,
    /// Warning message
    Warning,
    /// Error message
    Error,
    /// Success message
    Success,
}

/// Event delivered to status bus subscribers.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// A new operation has started and its task is now live.
    TaskStarted {
        /// Handle to the published task.
        task: Arc<BatchTask>,
    },
    /// A fire-and-forget message not tied to any task.
    Notice {
        /// Severity of the message.
        level: MessageLevel,
        /// Message text.
        message: String,
    },
}

/// Process-wide broadcast channel for task starts and notices.
///
/// Construct one per process and hand clones to whoever publishes or
/// subscribes; there is no ambient global instance.
#[derive(Debug, Clone)]
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    /// Creates a bus whose subscribers each buffer up to `capacity` events.
    /// A capacity below one is treated as one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _initial_receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Sends a status event, logging when nobody is subscribed.
    fn send(&self, event: StatusEvent) {
        if let Err(error) = self.sender.send(event) {
            warn!("Failed to deliver status event: {error}");
        }
    }

    /// Publishes a newly started task to every subscriber.
    pub fn publish(&self, task: Arc<BatchTask>) {
        self.send(StatusEvent::TaskStarted { task });
    }

    /// Publishes a bare notice to every subscriber.
    pub fn notice(&self, level: MessageLevel, message: String) {
        self.send(StatusEvent::Notice { level, message });
    }

    /// Publishes a bare notice with the causing error appended to the text.
    pub fn notice_with_error(&self, level: MessageLevel, message: String, error: &Error) {
        self.notice(level, format!("{message}: {error}"));
    }
}

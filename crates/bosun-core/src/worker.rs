//! Worker-side execution of batch operations.
//!
//! A runner owns the shared property descriptors and the bus. For each
//! operation it creates the task, publishes it, and spawns a worker driving
//! the operation body. The harness settles the task no matter how the body
//! exits: a body that returns without completing is completed on its
//! behalf, and failures and panics are recorded as errors before the
//! completion is stamped.

use core::result::Result as CoreResult;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt as _;
use tokio::spawn;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::bus::StatusBus;
use crate::config::StatusConfig;
use crate::error::Result;
use crate::task::{BatchTask, TaskProperties};

/// What `catch_unwind` hands back when the operation body panics.
type PanicPayload = Box<dyn Any + Send>;

/// Creates, publishes, and drives batch tasks.
///
/// Cloning is cheap; clones share the descriptors and the bus.
#[derive(Clone, Debug)]
pub struct OperationRunner {
    properties: Arc<TaskProperties>,
    bus: StatusBus,
    change_capacity: usize,
}

impl OperationRunner {
    /// Creates a runner that publishes on `bus` and sizes each task's
    /// change feed from `config`.
    pub fn new(properties: Arc<TaskProperties>, bus: StatusBus, config: &StatusConfig) -> Self {
        Self {
            properties,
            bus,
            change_capacity: config.bus.change_feed_capacity,
        }
    }

    /// Starts a batch operation.
    ///
    /// The task is created and published before the worker runs, so
    /// subscribers see it in its initial state. The worker owns all further
    /// mutation of the task except [`BatchTask::request_cancel`], which
    /// anyone may call through the returned handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn begin<Op, Fut>(
        &self,
        name: String,
        total_steps: Option<u32>,
        supports_cancel: bool,
        operation: Op,
    ) -> OperationHandle
    where
        Op: FnOnce(Arc<BatchTask>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let task = Arc::new(BatchTask::with_change_capacity(
            Arc::clone(&self.properties),
            name,
            total_steps,
            supports_cancel,
            self.change_capacity,
        ));
        self.bus.publish(Arc::clone(&task));

        let worker_task = Arc::clone(&task);
        let join = spawn(async move {
            let running = Arc::clone(&worker_task);
            let outcome = AssertUnwindSafe(async move { operation(running).await })
                .catch_unwind()
                .await;
            settle(&worker_task, outcome);
        });

        OperationHandle { task, join }
    }
}

/// Handle to one running operation.
#[derive(Debug)]
pub struct OperationHandle {
    task: Arc<BatchTask>,
    join: JoinHandle<()>,
}

impl OperationHandle {
    /// The task the worker is driving.
    pub fn task(&self) -> &Arc<BatchTask> {
        &self.task
    }

    /// Waits until the worker settles the task, then returns it.
    ///
    /// The task is settled even when the operation failed or panicked, so
    /// this waits no longer than the operation itself runs.
    pub async fn wait(self) -> Arc<BatchTask> {
        if let Err(join_error) = self.join.await {
            warn!(
                "Worker for \"{}\" did not shut down cleanly: {join_error}",
                self.task.name()
            );
        }
        self.task
    }
}

/// Brings the task to its terminal state after the operation body exits.
fn settle(task: &Arc<BatchTask>, outcome: CoreResult<Result<()>, PanicPayload>) {
    match outcome {
        Ok(Ok(())) => {
            if !task.is_complete() {
                warn!(
                    "Operation \"{}\" returned without completing its task",
                    task.name()
                );
                task.set_complete("Done".to_owned());
            }
        }
        Ok(Err(operation_error)) => {
            if task.is_complete() {
                warn!(
                    "Operation \"{}\" failed after completing its task: {operation_error}",
                    task.name()
                );
            } else {
                task.set_error(operation_error.to_string());
                task.set_complete("An unexpected error occurred".to_owned());
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            if task.is_complete() {
                error!(
                    "Operation \"{}\" panicked after completing its task: {message}",
                    task.name()
                );
            } else {
                task.set_error(format!("Operation panicked: {message}"));
                task.set_complete("An unexpected error occurred".to_owned());
            }
        }
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

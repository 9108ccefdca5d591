//! Task lifecycle and status propagation for batch operations.
//!
//! This crate provides the observable property framework, the batch task
//! model built on it, the status bus tasks are announced on, the
//! aggregation service folding live tasks into one combined status, and
//! the worker harness that drives operations and settles their tasks.

/// Status aggregation service and combined status folding.
pub mod aggregator;
/// Broadcast bus announcing new tasks and standalone notices.
pub mod bus;
/// Runtime configuration loading and defaults.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Typed property descriptors and the sparse stores backing them.
pub mod observable;
/// Poison-ignoring lock acquisition helpers.
pub mod sync;
/// Batch task model and its shared property descriptors.
pub mod task;
/// Operation runner and the worker-side task harness.
pub mod worker;

pub use aggregator::{CombinedStatus, ProgressState, StatusAggregator, StatusSink};
pub use bus::{MessageLevel, StatusBus, StatusEvent};
pub use config::{AggregatorConfig, BusConfig, CancellationConfig, StatusConfig};
pub use error::{Error, Result};
pub use observable::{
    ChangeCallback, DEFAULT_CHANGE_CAPACITY, Property, PropertyChange, PropertyKey, PropertyStore,
    PropertyValue,
};
pub use sync::{IgnoreLock, IgnoreRwLock};
pub use task::{BatchTask, TaskId, TaskProperties};
pub use worker::{OperationHandle, OperationRunner};

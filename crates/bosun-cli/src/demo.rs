//! Demo batch operations driven through the status pipeline.

use std::sync::Arc;
use std::time::Duration;

use bosun_core::{BatchTask, Error, OperationHandle, OperationRunner, Result, StatusConfig};
use tokio::time::sleep;

/// Sub-items paged through per step, to exercise fractional progress.
const QUANTA: u32 = 4;

/// Launches `ops` operations on the runner and returns their handles.
///
/// Operation names alternate between a retrieval and a deletion flavor.
/// With `flaky`, every operation records a warning on its second step; with
/// `fail`, the last operation aborts with an error on its third step.
pub fn launch(
    runner: &OperationRunner,
    config: &StatusConfig,
    ops: u32,
    steps: u32,
    flaky: bool,
    fail: bool,
) -> Vec<OperationHandle> {
    let pacing = config.cancellation.poll_interval();
    (1..=ops)
        .map(|index| {
            let name = if index % 2 == 1 {
                format!("Retrieving build definitions ({index})")
            } else {
                format!("Deleting service endpoints ({index})")
            };
            let fail_this = fail && index == ops;
            runner.begin(name, Some(steps), true, move |task| async move {
                run_operation(&task, steps, flaky, fail_this, pacing).await
            })
        })
        .collect()
}

/// One operation body: pages through `steps` items, honoring cancellation
/// between items.
async fn run_operation(
    task: &Arc<BatchTask>,
    steps: u32,
    flaky: bool,
    fail: bool,
    pacing: Duration,
) -> Result<()> {
    for step in 1..=steps {
        if task.is_canceled() {
            task.set_complete("Canceled".to_owned());
            return Ok(());
        }

        for quantum in 0..QUANTA {
            task.set_progress_for_current_step(f64::from(quantum) / f64::from(QUANTA));
            sleep(pacing).await;
        }

        if task.is_canceled() {
            task.set_complete("Canceled".to_owned());
            return Ok(());
        }
        if flaky && step == 2 {
            task.set_warning(format!("Item {step} skipped: transient backend error"));
        }
        if fail && step == 3 {
            return Err(Error::Operation(format!("item {step} unreachable")));
        }
        task.set_progress(step, format!("Processed item {step}"));
    }

    task.set_complete(format!("All {steps} items processed"));
    Ok(())
}

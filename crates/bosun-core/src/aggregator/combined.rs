//! Combined status folded from the live task list.

use std::sync::Arc;

use crate::bus::MessageLevel;
use crate::task::BatchTask;

/// Taskbar-style rendering state for the combined indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Nothing is running.
    Idle,
    /// Work is running and reporting measurable progress.
    Normal,
    /// Work is running but nothing reports a percentage.
    Indeterminate,
    /// A task that reports a percentage has flagged an error.
    Error,
}

/// One summary of every incomplete task, recomputed on each change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedStatus {
    /// Rendering state for the indicator
    pub state: ProgressState,
    /// Mean fraction across the tasks that report one, in `0.0..=1.0`
    pub percent: Option<f64>,
    /// Number of incomplete tasks, whether or not they report progress
    pub incomplete: usize,
}

impl CombinedStatus {
    /// The status when nothing is running.
    pub fn idle() -> Self {
        Self {
            state: ProgressState::Idle,
            percent: None,
            incomplete: 0,
        }
    }

    /// Folds a task list into one summary.
    ///
    /// Complete tasks are skipped entirely. The percentage is the mean over
    /// the incomplete tasks that report one; tasks with unknown totals count
    /// toward `incomplete` but never dilute the mean. When no task reports a
    /// percentage the state is [`ProgressState::Indeterminate`], and error
    /// flags on such tasks do not surface here (they still surface on the
    /// task itself).
    pub fn from_tasks<'task>(tasks: impl IntoIterator<Item = &'task Arc<BatchTask>>) -> Self {
        let mut incomplete = 0usize;
        let mut reporting = 0usize;
        let mut reported_sum = 0.0f64;
        let mut reporting_error = false;

        for task in tasks {
            if task.is_complete() {
                continue;
            }
            incomplete += 1;
            if let Some(percent) = task.percent_complete() {
                reporting += 1;
                reported_sum += percent;
                if task.is_error() {
                    reporting_error = true;
                }
            }
        }

        if incomplete == 0 {
            return Self::idle();
        }
        if reporting == 0 {
            return Self {
                state: ProgressState::Indeterminate,
                percent: None,
                incomplete,
            };
        }

        let state = if reporting_error {
            ProgressState::Error
        } else {
            ProgressState::Normal
        };
        Self {
            state,
            percent: Some(reported_sum / reporting as f64),
            incomplete,
        }
    }

    /// Title decoration for the summary, or `None` when idle.
    ///
    /// Examples: `Executing 3 tasks (42% complete)`, `Executing 1 task`.
    pub fn title_suffix(&self) -> Option<String> {
        if self.incomplete == 0 {
            return None;
        }
        let plural = if self.incomplete == 1 { "" } else { "s" };
        let text = match self.percent {
            Some(percent) => {
                let rounded = (percent * 100.0).round() as u32;
                format!(
                    "Executing {} task{plural} ({rounded}% complete)",
                    self.incomplete
                )
            }
            None => format!("Executing {} task{plural}", self.incomplete),
        };
        Some(text)
    }
}

/// Receives pushes from the aggregation service.
///
/// Implementations are called from the aggregator's own tasks and should
/// return quickly; anything slow belongs behind a channel.
pub trait StatusSink: Send + Sync {
    /// Replaces the window or terminal title decoration, `None` clears it.
    fn set_title_suffix(&self, suffix: Option<&str>);

    /// Updates the progress indicator.
    fn set_progress(&self, state: ProgressState, percent: Option<f64>);

    /// Surfaces a standalone notice published on the bus.
    fn notice(&self, level: MessageLevel, message: &str);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, reason = "Tests compare exact fractions")]

    use super::*;
    use crate::task::TaskProperties;

    fn task_with_total(total: Option<u32>) -> Arc<BatchTask> {
        Arc::new(BatchTask::new(
            Arc::new(TaskProperties::new()),
            "Deleting service endpoints".to_owned(),
            total,
            false,
        ))
    }

    #[test]
    fn test_empty_list_is_idle() {
        let status = CombinedStatus::from_tasks(&[]);
        assert_eq!(status, CombinedStatus::idle());
        assert_eq!(status.title_suffix(), None);
    }

    #[test]
    fn test_mean_over_reporting_tasks_only() {
        let first = task_with_total(Some(5));
        first.set_progress(1, "Working".to_owned());
        let second = task_with_total(Some(5));
        second.set_progress(4, "Working".to_owned());
        let third = task_with_total(None);
        third.set_progress(2, "Working".to_owned());

        let tasks = vec![first, second, third];
        let status = CombinedStatus::from_tasks(&tasks);
        assert_eq!(status.state, ProgressState::Normal);
        assert_eq!(status.percent, Some(0.5));
        assert_eq!(status.incomplete, 3);
    }

    #[test]
    fn test_complete_tasks_are_skipped() {
        let done = task_with_total(Some(4));
        done.set_progress(1, "Working".to_owned());
        done.set_complete("Done".to_owned());
        let running = task_with_total(Some(4));
        running.set_progress(3, "Working".to_owned());

        let tasks = vec![done, running];
        let status = CombinedStatus::from_tasks(&tasks);
        assert_eq!(status.incomplete, 1);
        assert_eq!(status.percent, Some(0.75));
    }

    #[test]
    fn test_all_complete_is_idle() {
        let first = task_with_total(Some(2));
        first.set_complete("Done".to_owned());
        let second = task_with_total(None);
        second.set_complete("Done".to_owned());

        let tasks = vec![first, second];
        assert_eq!(CombinedStatus::from_tasks(&tasks), CombinedStatus::idle());
    }

    #[test]
    fn test_no_percentages_is_indeterminate() {
        let first = task_with_total(None);
        let second = task_with_total(None);
        second.set_error("Endpoint refused deletion".to_owned());

        let tasks = vec![first, second];
        let status = CombinedStatus::from_tasks(&tasks);
        assert_eq!(status.state, ProgressState::Indeterminate);
        assert_eq!(status.percent, None);
        assert_eq!(status.incomplete, 2);
    }

    #[test]
    fn test_reporting_task_error_surfaces() {
        let healthy = task_with_total(Some(10));
        healthy.set_progress(5, "Working".to_owned());
        let failing = task_with_total(Some(10));
        failing.set_progress(5, "Working".to_owned());
        failing.set_error("Item 3 unreachable".to_owned());

        let tasks = vec![healthy, failing];
        let status = CombinedStatus::from_tasks(&tasks);
        assert_eq!(status.state, ProgressState::Error);
        assert_eq!(status.percent, Some(0.5));
    }

    #[test]
    fn test_title_suffix_formats() {
        let singular = CombinedStatus {
            state: ProgressState::Indeterminate,
            percent: None,
            incomplete: 1,
        };
        assert_eq!(singular.title_suffix().as_deref(), Some("Executing 1 task"));

        let plural = CombinedStatus {
            state: ProgressState::Normal,
            percent: Some(0.42),
            incomplete: 3,
        };
        assert_eq!(
            plural.title_suffix().as_deref(),
            Some("Executing 3 tasks (42% complete)")
        );
    }

    #[test]
    fn test_title_suffix_rounds_percent() {
        let status = CombinedStatus {
            state: ProgressState::Normal,
            percent: Some(0.666),
            incomplete: 2,
        };
        assert_eq!(
            status.title_suffix().as_deref(),
            Some("Executing 2 tasks (67% complete)")
        );
    }
}

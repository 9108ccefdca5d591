//! End-to-end tests for the bus, aggregation, and worker pipeline.

#![cfg_attr(
    test,
    allow(
        clippy::tests_outside_test_module,
        clippy::missing_panics_doc,
        clippy::float_cmp,
        reason = "Test file allows"
    )
)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bosun_core::{
    CombinedStatus, Error, IgnoreLock as _, MessageLevel, OperationRunner, ProgressState,
    StatusAggregator, StatusBus, StatusConfig, StatusSink, TaskProperties,
};
use tokio::sync::oneshot;
use tokio::time::sleep;

/// Sink that records every push for later assertions.
#[derive(Default)]
struct RecordingSink {
    progress: Mutex<Vec<(ProgressState, Option<f64>)>>,
    titles: Mutex<Vec<Option<String>>>,
    notices: Mutex<Vec<(MessageLevel, String)>>,
}

impl RecordingSink {
    fn last_progress(&self) -> Option<(ProgressState, Option<f64>)> {
        self.progress.lock_ignore_poison().last().copied()
    }

    fn last_title(&self) -> Option<Option<String>> {
        self.titles.lock_ignore_poison().last().cloned()
    }

    fn notices(&self) -> Vec<(MessageLevel, String)> {
        self.notices.lock_ignore_poison().clone()
    }
}

impl StatusSink for RecordingSink {
    fn set_title_suffix(&self, suffix: Option<&str>) {
        self.titles
            .lock_ignore_poison()
            .push(suffix.map(str::to_owned));
    }

    fn set_progress(&self, state: ProgressState, percent: Option<f64>) {
        self.progress.lock_ignore_poison().push((state, percent));
    }

    fn notice(&self, level: MessageLevel, message: &str) {
        self.notices
            .lock_ignore_poison()
            .push((level, message.to_owned()));
    }
}

fn pipeline(
    config: &StatusConfig,
) -> (
    OperationRunner,
    StatusAggregator,
    Arc<RecordingSink>,
    StatusBus,
) {
    let bus = StatusBus::new(config.bus.capacity);
    let sink = Arc::new(RecordingSink::default());
    let sink_for_aggregator: Arc<dyn StatusSink> = Arc::<RecordingSink>::clone(&sink);
    let aggregator = StatusAggregator::spawn(&bus, sink_for_aggregator, config);
    let runner = OperationRunner::new(Arc::new(TaskProperties::new()), bus.clone(), config);
    (runner, aggregator, sink, bus)
}

#[tokio::test(start_paused = true)]
async fn test_combined_status_over_three_tasks() {
    let config = StatusConfig::default();
    let (runner, aggregator, sink, _bus) = pipeline(&config);

    let (release_first, held_first) = oneshot::channel::<()>();
    let first = runner.begin(
        "Retrieving build definitions".to_owned(),
        Some(5),
        false,
        move |task| async move {
            task.set_progress(1, "Retrieved team project list".to_owned());
            drop(held_first.await);
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );

    let (release_second, held_second) = oneshot::channel::<()>();
    let second = runner.begin(
        "Deleting service endpoints".to_owned(),
        Some(5),
        false,
        move |task| async move {
            task.set_progress(4, "Deleted endpoint staging".to_owned());
            drop(held_second.await);
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );

    let (release_third, held_third) = oneshot::channel::<()>();
    let third = runner.begin(
        "Scanning team projects".to_owned(),
        None,
        false,
        move |task| async move {
            task.set_progress(2, "Scanned project Fabrikam".to_owned());
            drop(held_third.await);
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );

    sleep(Duration::from_millis(1)).await;

    let combined = aggregator.combined();
    assert_eq!(combined.state, ProgressState::Normal);
    assert_eq!(combined.percent, Some(0.5));
    assert_eq!(combined.incomplete, 3);
    assert_eq!(sink.last_progress(), Some((ProgressState::Normal, Some(0.5))));
    assert_eq!(
        sink.last_title(),
        Some(Some("Executing 3 tasks (50% complete)".to_owned()))
    );

    let _ = release_first.send(());
    let _ = release_second.send(());
    let _ = release_third.send(());
    first.wait().await;
    second.wait().await;
    third.wait().await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(aggregator.combined(), CombinedStatus::idle());
    assert_eq!(sink.last_progress(), Some((ProgressState::Idle, None)));
    assert_eq!(sink.last_title(), Some(None));
}

#[tokio::test(start_paused = true)]
async fn test_completed_tasks_evict_after_retention_unless_pinned() {
    let config = StatusConfig::default();
    let (runner, aggregator, _sink, _bus) = pipeline(&config);

    let kept = runner.begin(
        "Retrieving build definitions".to_owned(),
        Some(2),
        false,
        |task| async move {
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );
    let evicted = runner.begin(
        "Deleting service endpoints".to_owned(),
        Some(2),
        false,
        |task| async move {
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );

    let kept_task = kept.wait().await;
    let evicted_task = evicted.wait().await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(aggregator.tasks().len(), 2);
    assert!(evicted_task.is_complete());

    assert!(aggregator.pin(kept_task.id()));

    // Past the 30 second retention window, sweeping once per second.
    sleep(Duration::from_secs(32)).await;
    let remaining = aggregator.tasks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), kept_task.id());

    assert!(aggregator.unpin(kept_task.id()));
    sleep(Duration::from_secs(2)).await;
    assert!(aggregator.tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_revives_for_tasks_published_after_idle() {
    let config = StatusConfig::default();
    let (runner, aggregator, _sink, _bus) = pipeline(&config);

    let first = runner.begin(
        "Retrieving build definitions".to_owned(),
        Some(2),
        false,
        |task| async move {
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );
    first.wait().await;
    sleep(Duration::from_secs(32)).await;
    assert!(aggregator.tasks().is_empty());

    // The sweeper parked on the empty list; a fresh publication must bring
    // eviction back with it.
    let second = runner.begin(
        "Deleting service endpoints".to_owned(),
        Some(2),
        false,
        |task| async move {
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );
    let second_task = second.wait().await;
    sleep(Duration::from_millis(1)).await;
    assert!(second_task.is_complete());
    assert_eq!(aggregator.tasks().len(), 1);

    sleep(Duration::from_secs(32)).await;
    assert!(aggregator.tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_round_trip() {
    let config = StatusConfig::default();
    let (runner, aggregator, _sink, _bus) = pipeline(&config);
    let poll_interval = config.cancellation.poll_interval();

    let handle = runner.begin(
        "Deleting service endpoints".to_owned(),
        Some(100),
        true,
        move |task| async move {
            for step in 1u32..=100 {
                if task.is_canceled() {
                    task.set_complete("Canceled".to_owned());
                    return Ok(());
                }
                task.set_progress(step, format!("Deleted endpoint {step}"));
                sleep(poll_interval).await;
            }
            task.set_complete("All endpoints deleted".to_owned());
            Ok(())
        },
    );

    // A couple of poll intervals in, cancel through the live list the way
    // a frontend would.
    sleep(Duration::from_millis(500)).await;
    let tracked = aggregator.tasks();
    assert_eq!(tracked.len(), 1);
    assert!(tracked[0].request_cancel());

    let task = handle.wait().await;
    assert!(task.is_canceled());
    assert!(task.is_complete());
    assert_eq!(task.status(), "Canceled");
    assert!(task.current_step() < 100);
    assert!(!task.request_cancel());
}

#[tokio::test(start_paused = true)]
async fn test_notices_forward_to_sink() {
    let config = StatusConfig::default();
    let (_runner, _aggregator, sink, bus) = pipeline(&config);

    bus.notice(MessageLevel::Info, "Connected to collection".to_owned());
    bus.notice_with_error(
        MessageLevel::Warning,
        "Endpoint list may be stale".to_owned(),
        &Error::Operation("cache miss".to_owned()),
    );
    sleep(Duration::from_millis(1)).await;

    let notices = sink.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(
        notices[0],
        (MessageLevel::Info, "Connected to collection".to_owned())
    );
    assert_eq!(notices[1].0, MessageLevel::Warning);
    assert!(notices[1].1.contains("cache miss"));
}

#[tokio::test(start_paused = true)]
async fn test_watcher_recovers_after_change_feed_overflow() {
    let mut config = StatusConfig::default();
    config.bus.change_feed_capacity = 4;
    let (runner, aggregator, sink, _bus) = pipeline(&config);

    let (release, held) = oneshot::channel::<()>();
    let handle = runner.begin(
        "Retrieving build definitions".to_owned(),
        Some(40),
        true,
        move |task| async move {
            // Far more changes than the feed buffers.
            for step in 1u32..=40 {
                task.set_progress(step, format!("Retrieved page {step}"));
            }
            drop(held.await);
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );

    sleep(Duration::from_millis(1)).await;

    let combined = aggregator.combined();
    assert_eq!(combined.percent, Some(1.0));
    assert_eq!(sink.last_progress(), Some((ProgressState::Normal, Some(1.0))));
    assert_eq!(
        sink.last_title(),
        Some(Some("Executing 1 task (100% complete)".to_owned()))
    );

    let _ = release.send(());
    handle.wait().await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(aggregator.combined(), CombinedStatus::idle());
}

#[tokio::test(start_paused = true)]
async fn test_dismissing_a_running_task() {
    let config = StatusConfig::default();
    let (runner, aggregator, sink, _bus) = pipeline(&config);

    let (release, held) = oneshot::channel::<()>();
    let handle = runner.begin(
        "Deleting service endpoints".to_owned(),
        Some(4),
        true,
        move |task| async move {
            task.set_progress(1, "Deleted endpoint staging".to_owned());
            drop(held.await);
            task.set_complete("Done".to_owned());
            Ok(())
        },
    );

    sleep(Duration::from_millis(1)).await;
    let task_id = handle.task().id();
    assert!(aggregator.dismiss(task_id));
    assert!(!aggregator.dismiss(task_id));
    assert!(aggregator.tasks().is_empty());
    assert_eq!(sink.last_progress(), Some((ProgressState::Idle, None)));
    assert_eq!(sink.last_title(), Some(None));

    // The worker is unaffected and still settles its task.
    let _ = release.send(());
    let task = handle.wait().await;
    assert!(task.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_dismissing_middle_task_preserves_remaining_order() {
    let config = StatusConfig::default();
    let (runner, aggregator, _sink, _bus) = pipeline(&config);

    let mut task_ids = Vec::new();
    for name in [
        "Retrieving build definitions",
        "Deleting service endpoints",
        "Scanning team projects",
    ] {
        let handle = runner.begin(name.to_owned(), Some(2), false, |task| async move {
            task.set_complete("Done".to_owned());
            Ok(())
        });
        task_ids.push(handle.wait().await.id());
    }
    sleep(Duration::from_millis(1)).await;
    assert_eq!(aggregator.tasks().len(), 3);

    assert!(aggregator.dismiss(task_ids[1]));

    // Newest-first order of the survivors is untouched by the removal.
    let remaining = aggregator.tasks();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].id(), task_ids[2]);
    assert_eq!(remaining[1].id(), task_ids[0]);
}

#[tokio::test(start_paused = true)]
async fn test_error_on_reporting_task_drives_error_state() {
    let config = StatusConfig::default();
    let (runner, aggregator, sink, _bus) = pipeline(&config);

    let (release, held) = oneshot::channel::<()>();
    let handle = runner.begin(
        "Deleting service endpoints".to_owned(),
        Some(4),
        false,
        move |task| async move {
            task.set_progress(2, "Deleted endpoint staging".to_owned());
            task.set_error("Endpoint production refused deletion".to_owned());
            drop(held.await);
            task.set_complete("Stopped after failure".to_owned());
            Ok(())
        },
    );

    sleep(Duration::from_millis(1)).await;
    assert_eq!(aggregator.combined().state, ProgressState::Error);
    assert_eq!(sink.last_progress(), Some((ProgressState::Error, Some(0.5))));

    let _ = release.send(());
    let task = handle.wait().await;
    assert!(task.is_error());
    assert_eq!(task.status(), "Stopped after failure");
    sleep(Duration::from_millis(1)).await;
    assert_eq!(aggregator.combined(), CombinedStatus::idle());
}

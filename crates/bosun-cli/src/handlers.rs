//! Command handlers for CLI operations

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use bosun_core::{
    BatchTask, MessageLevel, OperationRunner, StatusAggregator, StatusBus, StatusConfig,
    StatusSink, TaskProperties,
};
use console::{Term, style};
use tokio::fs as async_fs;
use tokio::signal::ctrl_c;
use tokio::spawn;
use tokio::time::sleep;
use tracing::warn;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use crate::demo;
use crate::status_line::TerminalStatusSink;

/// Handle a batch operation run end to end
///
/// # Errors
/// Returns an error if logging, configuration, or terminal output fails, or
/// when any operation ends in an error state
pub async fn handle_run(
    ops: u32,
    steps: u32,
    flaky: bool,
    fail: bool,
    cancel_after_ms: Option<u64>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let bosun_dir = match data_dir {
        Some(dir) => dir,
        None => StatusConfig::config_dir().context("Could not resolve the bosun directory")?,
    };
    async_fs::create_dir_all(&bosun_dir).await?;

    // Logs go to a file so the status line owns the terminal.
    let debug_log = bosun_dir.join("debug.log");
    if async_fs::try_exists(&debug_log).await.unwrap_or(false) {
        async_fs::remove_file(&debug_log).await?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&debug_log)?;

    Registry::default()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bosun_core=info,bosun_cli=info".into()),
        )
        .with(
            fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .init();

    let config = load_config(&bosun_dir.join("config.toml"));

    let bus = StatusBus::new(config.bus.capacity);
    let sink: Arc<dyn StatusSink> = Arc::new(TerminalStatusSink::new());
    let aggregator = StatusAggregator::spawn(&bus, sink, &config);
    let runner = OperationRunner::new(Arc::new(TaskProperties::new()), bus.clone(), &config);

    bus.notice(
        MessageLevel::Info,
        format!("Starting {ops} batch operations"),
    );

    let handles = demo::launch(&runner, &config, ops, steps, flaky, fail);

    // Ctrl-C asks the workers to stop instead of killing the process.
    let interrupt_targets = aggregator.clone();
    spawn(async move {
        if let Err(error) = ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {error}");
            return;
        }
        cancel_live_tasks(&interrupt_targets);
    });

    if let Some(delay_ms) = cancel_after_ms {
        let delayed_targets = aggregator.clone();
        spawn(async move {
            sleep(Duration::from_millis(delay_ms)).await;
            cancel_live_tasks(&delayed_targets);
        });
    }

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.wait().await);
    }

    // Let the aggregator fold the last completions into the status line.
    sleep(Duration::from_millis(50)).await;

    render_report(&finished)?;

    let failures = finished.iter().filter(|task| task.is_error()).count();
    if failures > 0 {
        let plural = if failures == 1 { "" } else { "s" };
        anyhow::bail!("{failures} operation{plural} failed");
    }
    Ok(())
}

/// Show the active configuration
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or printed
pub fn handle_config(full: bool) -> Result<()> {
    let config = StatusConfig::load_or_create()?;
    let term = Term::stdout();

    if full {
        let rendered = toml::to_string_pretty(&config)?;
        term.write_line(&rendered)?;
    } else {
        term.write_line(&format!("bus capacity: {}", config.bus.capacity))?;
        term.write_line(&format!(
            "change feed capacity: {}",
            config.bus.change_feed_capacity
        ))?;
        term.write_line(&format!(
            "completed retention: {}s",
            config.aggregator.completed_retention_secs
        ))?;
        term.write_line(&format!(
            "sweep interval: {}ms",
            config.aggregator.sweep_interval_ms
        ))?;
        term.write_line(&format!(
            "cancel poll interval: {}ms",
            config.cancellation.poll_interval_ms
        ))?;
    }
    Ok(())
}

/// Requests cancellation on every live task that supports it.
fn cancel_live_tasks(aggregator: &StatusAggregator) {
    for task in aggregator.tasks() {
        if task.supports_cancel() && !task.is_complete() {
            task.request_cancel();
        }
    }
}

fn load_config(config_path: &Path) -> StatusConfig {
    if config_path.exists() {
        StatusConfig::load_from_file(config_path).unwrap_or_else(|error| {
            warn!("Failed to load config: {error}");
            warn!("Using default configuration");
            StatusConfig::default()
        })
    } else {
        let config = StatusConfig::default();
        if let Err(error) = config.save_to_file(config_path) {
            warn!("Failed to write default config: {error}");
        }
        config
    }
}

/// Prints the per-task report once every operation settled.
fn render_report(finished: &[Arc<BatchTask>]) -> Result<()> {
    let term = Term::stdout();
    term.write_line("")?;
    term.write_line(&format!("{}", style("Batch report").cyan().bold()))?;

    for task in finished {
        term.write_line(&format!("{} {}", task_marker(task), task.name()))?;
        if let Some(completed) = task.time_completed() {
            term.write_line(&format!(
                "    finished at {}",
                completed.format("%H:%M:%S UTC")
            ))?;
        }
        for line in task.status_history() {
            term.write_line(&format!("    - {line}"))?;
        }
    }

    let succeeded = finished
        .iter()
        .filter(|task| !task.is_error() && !task.is_canceled())
        .count();
    let warned = finished.iter().filter(|task| task.is_warning()).count();
    let failed = finished.iter().filter(|task| task.is_error()).count();
    let canceled = finished.iter().filter(|task| task.is_canceled()).count();
    term.write_line("")?;
    term.write_line(&format!(
        "{succeeded} succeeded, {warned} warned, {failed} failed, {canceled} canceled"
    ))?;
    Ok(())
}

fn task_marker(task: &BatchTask) -> String {
    if task.is_error() {
        format!("{}", style("❌").red())
    } else if task.is_canceled() {
        format!("{}", style("⏸").yellow())
    } else if task.is_warning() {
        format!("{}", style("⚠").yellow())
    } else {
        format!("{}", style("✅").green())
    }
}

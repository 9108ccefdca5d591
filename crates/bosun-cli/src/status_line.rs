//! Terminal rendering of the combined status.

use std::sync::Mutex;

use bosun_core::{IgnoreLock as _, MessageLevel, ProgressState, StatusSink};
use console::{Term, style};
use tracing::warn;

/// Character width of the progress bar.
const BAR_WIDTH: usize = 20;

/// Sink that renders the combined status on the terminal.
///
/// The status occupies one line that is redrawn in place; notices scroll
/// above it. The title suffix goes into the terminal title.
pub struct TerminalStatusSink {
    term: Term,
    last_progress: Mutex<Option<(ProgressState, Option<f64>)>>,
}

impl TerminalStatusSink {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
            last_progress: Mutex::new(None),
        }
    }

    /// Redraws the status line from the last recorded push.
    fn draw_status(&self) {
        let snapshot = *self.last_progress.lock_ignore_poison();
        let result = match snapshot {
            None | Some((ProgressState::Idle, _)) => self.term.clear_line(),
            Some((state, percent)) => {
                let bar = percent.map_or_else(|| "working".to_owned(), bar_text);
                let line = match state {
                    ProgressState::Error => format!("{}", style(bar).red()),
                    ProgressState::Indeterminate => format!("{}", style(bar).cyan().dim()),
                    ProgressState::Normal | ProgressState::Idle => {
                        format!("{}", style(bar).cyan())
                    }
                };
                self.term
                    .clear_line()
                    .and_then(|()| self.term.write_str(&line))
            }
        };
        if let Err(error) = result {
            warn!("Failed to draw status line: {error}");
        }
    }
}

impl Default for TerminalStatusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for TerminalStatusSink {
    fn set_title_suffix(&self, suffix: Option<&str>) {
        match suffix {
            Some(text) => self.term.set_title(format!("bosun - {text}")),
            None => self.term.set_title("bosun"),
        }
    }

    fn set_progress(&self, state: ProgressState, percent: Option<f64>) {
        *self.last_progress.lock_ignore_poison() = Some((state, percent));
        self.draw_status();
    }

    fn notice(&self, level: MessageLevel, message: &str) {
        let line = match level {
            MessageLevel::Info => message.to_owned(),
            MessageLevel::Warning => format!("{}", style(format!("⚠ {message}")).yellow()),
            MessageLevel::Error => format!("{}", style(format!("❌ {message}")).red()),
            MessageLevel::Success => format!("{}", style(format!("✓ {message}")).green()),
        };
        let result = self
            .term
            .clear_line()
            .and_then(|()| self.term.write_line(&line));
        if let Err(error) = result {
            warn!("Failed to write notice: {error}");
        }
        self.draw_status();
    }
}

/// Renders a fraction in `[0, 1]` as a bar with a trailing percentage.
fn bar_text(fraction: f64) -> String {
    let display = (fraction * 100.0).round() as usize;
    let filled = (BAR_WIDTH * display.min(100) / 100).min(BAR_WIDTH);
    let empty = BAR_WIDTH.saturating_sub(filled);
    format!("{}{} {display:>3}%", "▓".repeat(filled), "░".repeat(empty))
}

/// Progress observers
///
/// Scans and derivation batches do not own a progress bar or a logger. They
/// are handed an observer for the length of one command and report through
/// it. Reporting never feeds back into the run.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, trace, warn, Level};

use crate::telemetry::ProgressCounter;

/// Number of positions on the bar; progress fractions are scaled to this.
pub const BAR_LENGTH: u64 = 1_000;

pub trait ScanObserver {
    /// `progress` is a fraction in [0, 1].
    fn report(&mut self, progress: f64, message: &str);

    fn log(&mut self, level: Level, message: &str) {
        log_at(level, message);
    }

    /// Called once when the run ends, on every exit path.
    fn finish(&mut self) {}
}

pub(crate) fn log_at(level: Level, message: &str) {
    if level == Level::ERROR {
        error!("{}", message);
    } else if level == Level::WARN {
        warn!("{}", message);
    } else if level == Level::INFO {
        info!("{}", message);
    } else if level == Level::DEBUG {
        debug!("{}", message);
    } else {
        trace!("{}", message);
    }
}

/// Discards reports. Log lines still go to `tracing`.
#[derive(Debug, Default)]
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn report(&mut self, _progress: f64, _message: &str) {}
}

/// Terminal progress bar. Draws to stderr and hides itself when stderr is not
/// a terminal.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message("Unknown");
        Self { bar }
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanObserver for ProgressBarObserver {
    fn report(&mut self, progress: f64, message: &str) {
        let position = (progress.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64;
        self.bar.set_position(position);
        self.bar.set_message(message.to_string());
    }

    fn log(&mut self, level: Level, message: &str) {
        self.bar.suspend(|| log_at(level, message));
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Writes every `interval`-th report as a log line. For runs without a
/// terminal.
pub struct LogObserver {
    counter: ProgressCounter,
}

impl LogObserver {
    pub fn new(interval: u64) -> Self {
        Self { counter: ProgressCounter::new(interval.max(1)) }
    }
}

impl ScanObserver for LogObserver {
    fn report(&mut self, progress: f64, message: &str) {
        if self.counter.should_log() {
            info!(progress = %format!("{:.2}%", progress * 100.0), "{}", message);
        }
    }
}

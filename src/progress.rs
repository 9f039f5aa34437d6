use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
const BAR_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub total_bytes: u64,
    pub completed_bytes: u64,
}

impl ProgressState {
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        let raw = self.completed_bytes as f64 / self.total_bytes as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }
}

// A value that rounds up to 1024 is carried into the next unit, so 1_048_575
// reads as 1.00 MB rather than 1024.00 KB.
pub fn format_size(bytes: u64) -> (f64, &'static str) {
    if bytes == 0 {
        return (0.0, SIZE_UNITS[0]);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let mut rounded = (value * 100.0).round() / 100.0;
    if rounded >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        rounded = ((rounded / 1024.0) * 100.0).round() / 100.0;
        unit += 1;
    }
    (rounded, SIZE_UNITS[unit])
}

/// Byte counter shared by all range fetchers. Drawing happens on a separate
/// renderer task, never on the fetchers.
pub struct ProgressTracker {
    total_bytes: u64,
    completed: AtomicU64,
    bar: ProgressBar,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, already_downloaded: u64, draw_target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total_bytes), draw_target);
        bar.set_style(ProgressStyle::default_bar().template("{msg}").unwrap());

        let tracker = Self {
            total_bytes,
            completed: AtomicU64::new(already_downloaded.min(total_bytes)),
            bar,
        };
        tracker.render();
        tracker
    }

    pub fn hidden(total_bytes: u64, already_downloaded: u64) -> Self {
        Self::new(total_bytes, already_downloaded, ProgressDrawTarget::hidden())
    }

    pub fn record_bytes(&self, n: u64) {
        let total = self.total_bytes;
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .completed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n).min(total))
            });
    }

    pub fn snapshot(&self) -> ProgressState {
        ProgressState {
            total_bytes: self.total_bytes,
            completed_bytes: self.completed.load(Ordering::Acquire),
        }
    }

    pub fn progress_line(&self) -> String {
        let state = self.snapshot();
        let percent = state.percentage();
        let filled = ((percent / 10.0) as usize).min(BAR_WIDTH);
        let (done, done_unit) = format_size(state.completed_bytes);
        let (total, total_unit) = format_size(state.total_bytes);

        format!(
            "[{}{}] {:.2}% {:.2} {}/{:.2} {} downloaded",
            "#".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            percent,
            done,
            done_unit,
            total,
            total_unit
        )
    }

    // Draw failures are absorbed by indicatif.
    pub fn render(&self) {
        self.bar.set_position(self.snapshot().completed_bytes);
        self.bar.set_message(self.progress_line());
        self.bar.tick();
    }

    pub fn spawn_renderer(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tracker.render();
                tokio::time::sleep(interval).await;
            }
        })
    }

    pub fn finish(&self) {
        self.render();
        self.bar.finish();
    }
}

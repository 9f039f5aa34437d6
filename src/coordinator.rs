use indicatif::ProgressDrawTarget;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, error, info};

use crate::config::DownloadConfig;
use crate::error::{DownloadError, FetchError};
use crate::fetcher::fetch_range;
use crate::planner::plan;
use crate::progress::ProgressTracker;
use crate::source::RangeSource;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub url: String,
    pub path: PathBuf,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadStats {
    pub total_bytes: u64,
    /// Bytes already on disk when the job started.
    pub resumed_from: u64,
    /// Includes `resumed_from`.
    pub completed_bytes: u64,
    pub elapsed: Duration,
}

impl DownloadStats {
    // Total size over fetch time, not just the bytes fetched in this run.
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / secs / MIB
    }

    pub fn estimated_remaining(&self) -> Duration {
        let missing = self.total_bytes.saturating_sub(self.completed_bytes);
        let bytes_per_sec = self.throughput_mbps() * MIB;
        if missing == 0 || bytes_per_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(missing as f64 / bytes_per_sec)
    }
}

#[derive(Debug)]
pub enum DownloadOutcome {
    AlreadyComplete { total_bytes: u64, existing_bytes: u64 },
    Completed(DownloadStats),
    /// Bytes written by any worker stay on disk.
    Failed {
        stats: DownloadStats,
        errors: Vec<FetchError>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Allocation {
    Fresh,
    Resume(u64),
    Complete(u64),
}

pub struct DownloadCoordinator<S> {
    source: Arc<S>,
    config: DownloadConfig,
}

impl<S: RangeSource> DownloadCoordinator<S> {
    pub fn new(source: S, config: DownloadConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
        }
    }

    /// Worker failures never return `Err`; they are collected into
    /// [`DownloadOutcome::Failed`] once every worker has finished.
    pub async fn run(
        &self,
        target: &DownloadTarget,
        workers: NonZeroUsize,
    ) -> Result<DownloadOutcome, DownloadError> {
        let total_bytes = self.resolve_size(&target.url).await?;
        debug!(url = %target.url, total_bytes, "resolved size");

        let already_downloaded = match prepare_destination(&target.path, total_bytes).await? {
            Allocation::Fresh => 0,
            Allocation::Resume(existing) => {
                info!(existing_bytes = existing, "Resuming download...");
                existing
            }
            Allocation::Complete(existing) => {
                info!(path = %target.path.display(), "File already exists.");
                return Ok(DownloadOutcome::AlreadyComplete {
                    total_bytes,
                    existing_bytes: existing,
                });
            }
        };

        let ranges = plan(total_bytes, workers, already_downloaded);
        if ranges.is_empty() {
            return Ok(DownloadOutcome::AlreadyComplete {
                total_bytes,
                existing_bytes: already_downloaded,
            });
        }

        let tracker = Arc::new(if self.config.show_progress {
            ProgressTracker::new(total_bytes, already_downloaded, ProgressDrawTarget::stderr())
        } else {
            ProgressTracker::hidden(total_bytes, already_downloaded)
        });
        let renderer = tracker.spawn_renderer(self.config.refresh_interval);

        info!(ranges = ranges.len(), "starting range workers");
        let started = Instant::now();
        let mut handles = Vec::with_capacity(ranges.len());
        for range in ranges {
            let source = Arc::clone(&self.source);
            let target = target.clone();
            let tracker = Arc::clone(&tracker);

            let handle = tokio::spawn(async move {
                fetch_range(source.as_ref(), &target, range, &tracker).await
            });
            handles.push((range, handle));
        }

        let mut errors = Vec::new();
        for (range, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Aborted {
                    range,
                    reason: e.to_string(),
                }),
            };
            if let Err(e) = result {
                error!(range = %e.range(), "{}", e);
                errors.push(e);
            }
        }
        let elapsed = started.elapsed();

        renderer.abort();
        tracker.finish();

        let stats = DownloadStats {
            total_bytes,
            resumed_from: already_downloaded,
            completed_bytes: tracker.snapshot().completed_bytes,
            elapsed,
        };

        if errors.is_empty() {
            Ok(DownloadOutcome::Completed(stats))
        } else {
            Ok(DownloadOutcome::Failed { stats, errors })
        }
    }

    async fn resolve_size(&self, url: &str) -> Result<u64, DownloadError> {
        let size_unknown = |reason: String| DownloadError::SizeUnknown {
            url: url.to_string(),
            reason,
        };

        match self.source.content_length(url).await {
            Ok(Some(0)) => Err(size_unknown("server reported a length of 0".to_string())),
            Ok(Some(len)) => Ok(len),
            Ok(None) => Err(size_unknown("no usable Content-Length header".to_string())),
            Err(e) => Err(size_unknown(e.to_string())),
        }
    }
}

// An existing shorter file is trusted as a correctly written prefix.
async fn prepare_destination(path: &Path, total_bytes: u64) -> Result<Allocation, DownloadError> {
    let prepare_err = |source: std::io::Error| DownloadError::Prepare {
        path: path.to_path_buf(),
        source,
    };

    match fs::metadata(path).await {
        Ok(metadata) => {
            let existing = metadata.len();
            if existing >= total_bytes {
                return Ok(Allocation::Complete(existing));
            }
            // Fail early if the file cannot be written to.
            OpenOptions::new()
                .append(true)
                .open(path)
                .await
                .map_err(prepare_err)?;
            Ok(Allocation::Resume(existing))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let file = File::create(path).await.map_err(prepare_err)?;
            file.set_len(total_bytes).await.map_err(prepare_err)?;
            Ok(Allocation::Fresh)
        }
        Err(e) => Err(prepare_err(e)),
    }
}

//! Progress reporting and cancellation for replacement runs.
//!
//! A [`ProgressCallback`] receives a [`ProgressInfo`] snapshot every
//! `batch_size` encoded frames and once more when the run finishes. A
//! [`CancellationToken`] lets another thread stop a run between frames; the
//! partial output is discarded.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use reframe::{FrameReplacer, ProgressCallback, ProgressInfo, ReframeError, ReplaceOptions};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         match info.percentage {
//!             Some(pct) => println!("{pct:.1}% ({} reused)", info.reused),
//!             None => println!("{} frames", info.current),
//!         }
//!     }
//! }
//!
//! let options = ReplaceOptions::new().with_progress(Arc::new(PrintProgress));
//! FrameReplacer::new("input.mkv", "sr/%05d.png", "output.mkv")
//!     .options(options)
//!     .run()?;
//! # Ok::<(), ReframeError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// A snapshot of a running replacement.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames encoded so far.
    pub current: u64,
    /// Frame count declared by the container, if any.
    pub total: Option<u64>,
    /// Completion percentage (0.0 to 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Frames so far that reused an earlier substitute.
    pub reused: u64,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
    /// Estimated time remaining, from throughput so far.
    pub estimated_remaining: Option<Duration>,
    /// Index of the frame just encoded.
    pub current_frame: Option<u64>,
    /// Presentation time of the frame just encoded.
    pub current_timestamp: Option<Duration>,
}

/// Receives progress snapshots.
///
/// Callbacks observe only; use [`CancellationToken`] to stop a run.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` frames and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Shared cancellation flag.
///
/// ```
/// use reframe::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts encoded frames and fires the callback in batches.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    current: u64,
    reused: u64,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>, batch_size: u64) -> Self {
        Self {
            callback,
            total,
            current: 0,
            reused: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    /// Record one encoded frame.
    pub(crate) fn advance(&mut self, frame_index: u64, timestamp: Duration, reused: bool) {
        self.current += 1;
        if reused {
            self.reused += 1;
        }
        self.since_last_report += 1;

        if self.since_last_report >= self.batch_size {
            self.report(Some(frame_index), Some(timestamp));
            self.since_last_report = 0;
        }
    }

    /// Emit the final snapshot.
    pub(crate) fn finish(&mut self) {
        // The real count is known now, even if the container lied.
        if self.total.is_some_and(|total| total != self.current) {
            self.total = Some(self.current);
        }
        self.report(None, None);
    }

    fn report(&self, frame_index: Option<u64>, timestamp: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32 * 100.0).min(100.0));

        let estimated_remaining = match self.total {
            Some(total) if self.current > 0 => {
                let remaining = total.saturating_sub(self.current);
                Some(elapsed.mul_f64(remaining as f64 / self.current as f64))
            }
            _ => None,
        };

        self.callback.on_progress(&ProgressInfo {
            current: self.current,
            total: self.total,
            percentage,
            reused: self.reused,
            elapsed,
            estimated_remaining,
            current_frame: frame_index,
            current_timestamp: timestamp,
        });
    }
}

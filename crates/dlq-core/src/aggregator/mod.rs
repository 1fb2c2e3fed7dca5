//! Aggregate progress, rate, and ETA across the whole queue.
//!
//! Per-task rate is a sliding window over the last 10 seconds (capped at 32
//! samples) of `(timestamp, bytes_downloaded)` pairs; overall rate sums the
//! per-task rates and overall ETA derives from overall rate.

mod format;

pub use format::{format_bytes, format_duration};

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::queue_state::QueueState;

const WINDOW: Duration = Duration::from_secs(10);
const MAX_SAMPLES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes_downloaded: i64,
}

/// Per-task sliding window of recent byte counts, used to compute
/// instantaneous rate.
#[derive(Debug, Default)]
struct RateWindow {
    samples: VecDeque<Sample>,
}

impl RateWindow {
    fn record(&mut self, now: Instant, bytes_downloaded: i64) {
        self.samples.push_back(Sample { at: now, bytes_downloaded });
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes/sec between the oldest and newest sample still in the window.
    /// `None` until at least two samples have been recorded.
    fn rate_bytes_per_sec(&self) -> Option<f64> {
        let oldest = self.samples.front()?;
        let newest = self.samples.back()?;
        let elapsed = newest.at.duration_since(oldest.at).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let delta_bytes = (newest.bytes_downloaded - oldest.bytes_downloaded).max(0);
        Some(delta_bytes as f64 / elapsed)
    }
}

/// Owns one [`RateWindow`] per active task and produces an
/// [`AggregateProgress`] snapshot on demand.
#[derive(Debug, Default)]
pub struct Aggregator {
    windows: std::collections::HashMap<Uuid, RateWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateProgress {
    pub bytes_downloaded: i64,
    pub total_bytes: i64,
    pub overall_progress: f64,
    pub overall_rate_bytes_per_sec: f64,
    pub eta: Option<Duration>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_progress(&mut self, task_id: Uuid, now: Instant, bytes_downloaded: i64) {
        self.windows.entry(task_id).or_default().record(now, bytes_downloaded);
    }

    /// Drops a task's window; call on completion, failure, or removal so
    /// stale tasks don't accumulate memory.
    pub fn forget(&mut self, task_id: Uuid) {
        self.windows.remove(&task_id);
    }

    /// Byte-weighted overall progress when any task has a known size, else
    /// the unweighted mean of per-task progress; overall rate
    /// is the sum of each active task's instantaneous rate; ETA is
    /// `remaining_bytes / overall_rate`, `None` if the rate is zero or all
    /// sizes are unknown.
    pub fn snapshot(&self, state: &QueueState) -> AggregateProgress {
        let bytes_downloaded: i64 = state.tasks.iter().map(|t| t.bytes_downloaded).sum();
        let total_bytes: i64 = state.tasks.iter().map(|t| t.total_bytes).sum();

        let overall_progress = if total_bytes > 0 {
            (bytes_downloaded as f64 / total_bytes as f64).min(1.0)
        } else if state.tasks.is_empty() {
            0.0
        } else {
            state.tasks.iter().map(|t| t.progress).sum::<f64>() / state.tasks.len() as f64
        };

        let overall_rate: f64 = state
            .tasks
            .iter()
            .filter_map(|t| self.windows.get(&t.id))
            .filter_map(RateWindow::rate_bytes_per_sec)
            .sum();

        let remaining = (total_bytes - bytes_downloaded).max(0);
        let eta = if overall_rate > 0.0 && total_bytes > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / overall_rate))
        } else {
            None
        };

        AggregateProgress {
            bytes_downloaded,
            total_bytes,
            overall_progress,
            overall_rate_bytes_per_sec: overall_rate,
            eta,
        }
    }
}

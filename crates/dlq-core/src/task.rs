//! The scheduling and progress unit: `DownloadTask` and its `Status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::manifest::ManifestEntry;

/// Lifecycle state of a `DownloadTask`. Transitions are validated by
/// [`crate::lifecycle`], never assigned directly outside that module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Queued,
    Downloading,
    Paused,
    Extracting,
    Completed,
    Failed,
}

impl Status {
    /// `queued`, `downloading`, or `extracting` — counts toward the
    /// concurrency cap.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Queued | Status::Downloading | Status::Extracting)
    }

    /// Eligible for the scheduler to (re)select.
    pub fn can_start(self) -> bool {
        matches!(self, Status::Pending | Status::Paused | Status::Failed)
    }

    /// Eligible for a user- or network-initiated pause.
    pub fn can_pause(self) -> bool {
        matches!(self, Status::Queued | Status::Downloading)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// The scheduling and progress unit. Mutated only through
/// [`crate::lifecycle::transition`]; constructed by `DownloadTask::new` and
/// the Manager's `load_manifest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: Uuid,

    pub url: String,
    pub category: String,
    pub part_number: u32,
    pub total_parts: u32,
    pub dataset_name: String,
    pub created_at: DateTime<Utc>,

    pub status: Status,
    /// In `[0.0, 1.0]`.
    pub progress: f64,
    pub bytes_downloaded: i64,
    /// May grow when discovered from `Content-Length`; 0 means unknown.
    pub total_bytes: i64,
    pub error_message: Option<String>,
    pub resume_token_ref: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Needed to place the finished file under
    /// `{downloads}/completed/{task_id}_{filename}`.
    pub filename: String,
}

impl DownloadTask {
    pub fn new(entry: &ManifestEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: entry.url.clone(),
            category: entry.category.clone(),
            part_number: entry.part_number,
            total_parts: entry.total_parts,
            dataset_name: entry.dataset_name.clone(),
            created_at: Utc::now(),
            status: Status::Pending,
            progress: 0.0,
            bytes_downloaded: 0,
            total_bytes: entry.estimated_size.max(0),
            error_message: None,
            resume_token_ref: None,
            started_at: None,
            completed_at: None,
            filename: entry.filename.clone(),
        }
    }

    /// Recomputes `progress` from `bytes_downloaded`/`total_bytes`:
    /// `progress = min(bytes_downloaded/total_bytes, 1.0)` when
    /// `total_bytes > 0`, else unchanged (left at whatever the lifecycle
    /// machine forced, e.g. 1.0 on completion).
    pub fn recompute_progress(&mut self) {
        if self.total_bytes > 0 {
            self.progress = (self.bytes_downloaded as f64 / self.total_bytes as f64).min(1.0);
        }
    }

    pub fn set_bytes_downloaded(&mut self, bytes: i64) {
        self.bytes_downloaded = bytes.max(0);
        self.recompute_progress();
    }
}

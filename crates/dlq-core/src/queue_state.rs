//! Persistence root (`QueueState`) and the transient per-category read model
//! (`DownloadTaskGroup`) produced by the Aggregator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::task::{DownloadTask, Status};

/// Current on-disk schema version. Bump whenever the persisted shape of
/// `QueueState`/`DownloadTask` changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// The entire persisted queue: tasks plus their order, the global pause
/// flag, and the concurrency cap in effect when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueState {
    pub schema_version: u32,
    pub is_paused: bool,
    #[serde(default = "default_network_available")]
    pub is_network_available: bool,
    pub max_concurrent_downloads: usize,
    pub queue_order: Vec<Uuid>,
    pub tasks: Vec<DownloadTask>,
}

fn default_network_available() -> bool {
    true
}

impl QueueState {
    pub fn new(max_concurrent_downloads: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            is_paused: false,
            is_network_available: true,
            max_concurrent_downloads,
            queue_order: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// `set(queue_order) == set(tasks.id)` and `|queue_order| == |tasks|`.
    pub fn is_consistent(&self) -> bool {
        if self.queue_order.len() != self.tasks.len() {
            return false;
        }
        let order_ids: std::collections::HashSet<_> = self.queue_order.iter().collect();
        let task_ids: std::collections::HashSet<_> = self.tasks.iter().map(|t| &t.id).collect();
        order_ids == task_ids
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_active()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == Status::Pending)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == Status::Failed)
            .count()
    }

    /// Groups tasks by `category`, producing one `DownloadTaskGroup` per
    /// distinct category, in first-seen order.
    pub fn grouped_by_category(&self) -> Vec<DownloadTaskGroup> {
        let mut order: Vec<String> = Vec::new();
        let mut by_category: HashMap<String, Vec<DownloadTask>> = HashMap::new();
        for task in &self.tasks {
            by_category
                .entry(task.category.clone())
                .or_insert_with(|| {
                    order.push(task.category.clone());
                    Vec::new()
                })
                .push(task.clone());
        }
        order
            .into_iter()
            .map(|category| {
                let tasks = by_category.remove(&category).unwrap_or_default();
                DownloadTaskGroup::new(category, tasks)
            })
            .collect()
    }
}

/// Overall rollup status for a `DownloadTaskGroup`, derived from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Completed,
    Failed,
    Downloading,
    Paused,
    Pending,
}

/// Transient read-model: all tasks sharing a `category`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTaskGroup {
    pub category: String,
    pub tasks: Vec<DownloadTask>,
}

impl DownloadTaskGroup {
    pub fn new(category: String, tasks: Vec<DownloadTask>) -> Self {
        Self { category, tasks }
    }

    pub fn bytes_downloaded(&self) -> i64 {
        self.tasks.iter().map(|t| t.bytes_downloaded).sum()
    }

    pub fn total_bytes(&self) -> i64 {
        self.tasks.iter().map(|t| t.total_bytes).sum()
    }

    /// Byte-weighted when any task has a known size, else the unweighted
    /// mean of per-task progress (mirrors the Aggregator's overall formula
    /// at group scope).
    pub fn weighted_progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let total = self.total_bytes();
        if total > 0 {
            (self.bytes_downloaded() as f64 / total as f64).min(1.0)
        } else {
            self.tasks.iter().map(|t| t.progress).sum::<f64>() / self.tasks.len() as f64
        }
    }

    pub fn count_by_status(&self, status: Status) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// `completed` if all complete; else `failed` if any failed and none
    /// active; else `downloading` if any active; else `paused` if any
    /// paused and none pending; else `pending`.
    pub fn overall_status(&self) -> GroupStatus {
        let any_active = self.tasks.iter().any(|t| t.status.is_active());
        let any_failed = self.tasks.iter().any(|t| t.status == Status::Failed);
        let any_paused = self.tasks.iter().any(|t| t.status == Status::Paused);
        let any_pending = self.tasks.iter().any(|t| t.status == Status::Pending);
        let all_completed = !self.tasks.is_empty()
            && self.tasks.iter().all(|t| t.status == Status::Completed);

        if all_completed {
            GroupStatus::Completed
        } else if any_failed && !any_active {
            GroupStatus::Failed
        } else if any_active {
            GroupStatus::Downloading
        } else if any_paused && !any_pending {
            GroupStatus::Paused
        } else {
            GroupStatus::Pending
        }
    }
}

//! The single authoritative store of tasks: ordering, uniqueness, and the
//! concurrency-aware selection policy.
//!
//! `TaskQueue` owns a `QueueState` directly. It is not `Sync`/shared itself —
//! the Manager's event loop (the single task serializing all mutation)
//! is the only task that ever touches it, so every method here takes `&mut
//! self` and none of them need internal locking.

use uuid::Uuid;

use crate::queue_state::QueueState;
use crate::task::{DownloadTask, Status};

#[derive(Debug)]
pub struct TaskQueue {
    state: QueueState,
}

impl TaskQueue {
    pub fn new(max_concurrent_downloads: usize) -> Self {
        Self {
            state: QueueState::new(max_concurrent_downloads),
        }
    }

    pub fn from_state(state: QueueState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn into_state(self) -> QueueState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.state.is_paused = paused;
    }

    pub fn is_network_available(&self) -> bool {
        self.state.is_network_available
    }

    pub fn set_network_available(&mut self, available: bool) {
        self.state.is_network_available = available;
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.state.max_concurrent_downloads
    }

    pub fn set_max_concurrent_downloads(&mut self, n: usize) {
        self.state.max_concurrent_downloads = n;
    }

    /// Appends to the tail if `task.id` is new; duplicates are a no-op.
    pub fn enqueue(&mut self, task: DownloadTask) {
        if self.state.tasks.iter().any(|t| t.id == task.id) {
            return;
        }
        self.state.queue_order.push(task.id);
        self.state.tasks.push(task);
    }

    /// Batch enqueue, preserving input order; duplicates skipped.
    pub fn enqueue_all(&mut self, tasks: impl IntoIterator<Item = DownloadTask>) {
        for task in tasks {
            self.enqueue(task);
        }
    }

    /// Drops the task and its queue-order entry. Unknown ids are a no-op.
    pub fn remove(&mut self, id: Uuid) {
        self.state.tasks.retain(|t| t.id != id);
        self.state.queue_order.retain(|&qid| qid != id);
    }

    /// Removes and reinserts at `new_index`, clamped to `[0, len-1]`.
    /// Unknown ids are a no-op.
    pub fn reorder(&mut self, id: Uuid, new_index: usize) {
        let Some(pos) = self.state.queue_order.iter().position(|&qid| qid == id) else {
            return;
        };
        self.state.queue_order.remove(pos);
        let clamped = new_index.min(self.state.queue_order.len());
        self.state.queue_order.insert(clamped, id);
    }

    pub fn prioritize(&mut self, id: Uuid) {
        self.reorder(id, 0);
    }

    pub fn clear(&mut self) {
        self.state.tasks.clear();
        self.state.queue_order.clear();
    }

    /// Applies `mutator` to the task if present; no-op on unknown ids.
    pub fn update(&mut self, id: Uuid, mutator: impl FnOnce(&mut DownloadTask)) {
        if let Some(task) = self.state.tasks.iter_mut().find(|t| t.id == id) {
            mutator(task);
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&DownloadTask> {
        self.state.tasks.iter().find(|t| t.id == id)
    }

    /// All tasks, in queue order.
    pub fn all(&self) -> Vec<&DownloadTask> {
        self.state
            .queue_order
            .iter()
            .filter_map(|id| self.get(*id))
            .collect()
    }

    pub fn by_status(&self, status: Status) -> Vec<&DownloadTask> {
        self.all().into_iter().filter(|t| t.status == status).collect()
    }

    pub fn by_category<'a>(&'a self, category: &str) -> Vec<&'a DownloadTask> {
        self.all()
            .into_iter()
            .filter(|t| t.category == category)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.state.active_count()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending_count()
    }

    pub fn count_by_status(&self, status: Status) -> usize {
        self.state.tasks.iter().filter(|t| t.status == status).count()
    }

    /// The only selection policy: strict FIFO over `queue_order`, with
    /// `prioritize` as the sole override. Returns `None` when globally
    /// paused or the concurrency cap is already met.
    pub fn next_pending(&self) -> Option<Uuid> {
        if self.state.is_paused {
            return None;
        }
        if self.active_count() >= self.state.max_concurrent_downloads {
            return None;
        }
        self.state
            .queue_order
            .iter()
            .copied()
            .find(|&id| self.get(id).map(|t| t.status) == Some(Status::Pending))
    }
}

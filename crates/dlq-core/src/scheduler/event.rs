//! Messages flowing into and out of the scheduler's event loop: a single
//! task owns all mutable state, and every other task talks to it through a
//! channel.

use std::path::PathBuf;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::queue_state::QueueState;

/// Requests the event loop processes one at a time, in arrival order.
#[derive(Debug)]
pub enum Command {
    LoadManifest {
        entries: Vec<crate::manifest::ManifestEntry>,
    },
    Start,
    PauseAll,
    ResumeAll,
    RetryFailed,
    Clear,
    Pause(Uuid),
    Resume(Uuid),
    Cancel(Uuid),
    Retry(Uuid),
    Prioritize(Uuid),
    Remove(Uuid),
    Snapshot(oneshot::Sender<QueueState>),
    Shutdown,
}

/// Reported by a job task back to the event loop.
#[derive(Debug)]
pub enum JobOutcome {
    Progress {
        task_id: Uuid,
        bytes_downloaded: i64,
        total_bytes: Option<i64>,
    },
    Completed {
        task_id: Uuid,
    },
    Paused {
        task_id: Uuid,
        resume_token_ref: Option<PathBuf>,
    },
    Cancelled {
        task_id: Uuid,
    },
    Failed {
        task_id: Uuid,
        message: String,
        retryable: bool,
        resume_token_ref: Option<PathBuf>,
    },
}

/// What a running job should do next. Distinct from the plain stop-flag
/// Transport sees: the job task needs to know *why* it stopped to decide
/// between keeping a resume token (pause) and discarding it (cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSignal {
    Run,
    Pause,
    Cancel,
}

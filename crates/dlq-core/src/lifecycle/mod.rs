//! Per-task state transitions. `DownloadTask::status` is mutated exclusively
//! through [`apply`] so the legal-transition table holds for every reachable
//! state.

use chrono::Utc;
use thiserror::Error;

use crate::task::{DownloadTask, Status};

/// A requested transition, carrying whatever context the target state
/// needs (an error message, whether the resume token survives, ...).
#[derive(Debug, Clone)]
pub enum Transition {
    /// `pending | paused | failed -> queued`: the scheduler picked up the task.
    ToQueued,
    /// `queued -> downloading`: first byte received or job started.
    ToDownloading,
    /// `downloading | queued -> paused`: user pause, global pause, or
    /// network loss.
    ToPaused,
    /// `downloading -> extracting`: all bytes received.
    ToExtracting,
    /// `extracting -> completed`: handoff acknowledged.
    ToCompleted,
    /// `downloading | queued | extracting -> failed`: unrecoverable error.
    /// `retry_token_kept` should be `true` only when the error class
    /// permits a future retry.
    ToFailed {
        message: String,
        retry_token_kept: bool,
    },
    /// `any -> pending`: explicit reset, clears progress/error/tokens/timestamps.
    Reset,
    /// `paused -> pending`: network restored after a network-caused pause;
    /// makes the task eligible for re-selection without disturbing its
    /// progress or resume token.
    ToPending,
}

impl Transition {
    fn target(&self) -> Status {
        match self {
            Transition::ToQueued => Status::Queued,
            Transition::ToDownloading => Status::Downloading,
            Transition::ToPaused => Status::Paused,
            Transition::ToExtracting => Status::Extracting,
            Transition::ToCompleted => Status::Completed,
            Transition::ToFailed { .. } => Status::Failed,
            Transition::Reset => Status::Pending,
            Transition::ToPending => Status::Pending,
        }
    }

    fn is_legal_from(&self, from: Status) -> bool {
        match self {
            Transition::ToQueued => {
                matches!(from, Status::Pending | Status::Paused | Status::Failed)
            }
            Transition::ToDownloading => matches!(from, Status::Queued),
            Transition::ToPaused => matches!(from, Status::Downloading | Status::Queued),
            Transition::ToExtracting => matches!(from, Status::Downloading),
            Transition::ToCompleted => matches!(from, Status::Extracting),
            Transition::ToFailed { .. } => {
                matches!(from, Status::Downloading | Status::Queued | Status::Extracting)
            }
            Transition::Reset => true,
            Transition::ToPending => matches!(from, Status::Paused),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: Status,
    pub to: Status,
}

/// Applies `transition` to `task` if legal; illegal transitions are
/// rejected with no state change and no error surfaced beyond a debug log —
/// callers that want the log emit it from the returned error.
pub fn apply(task: &mut DownloadTask, transition: Transition) -> Result<(), IllegalTransition> {
    let from = task.status;
    let to = transition.target();
    if !transition.is_legal_from(from) {
        tracing::debug!(task_id = %task.id, ?from, ?to, "rejected illegal lifecycle transition");
        return Err(IllegalTransition { from, to });
    }

    match transition {
        Transition::ToQueued => {
            task.status = Status::Queued;
        }
        Transition::ToDownloading => {
            task.status = Status::Downloading;
            if task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
        }
        Transition::ToPaused => {
            task.status = Status::Paused;
        }
        Transition::ToExtracting => {
            task.status = Status::Extracting;
        }
        Transition::ToCompleted => {
            task.status = Status::Completed;
            task.completed_at = Some(Utc::now());
            task.error_message = None;
            task.resume_token_ref = None;
            task.progress = 1.0;
        }
        Transition::ToFailed {
            message,
            retry_token_kept,
        } => {
            task.status = Status::Failed;
            task.error_message = Some(message);
            if !retry_token_kept {
                task.resume_token_ref = None;
            }
        }
        Transition::Reset => {
            task.status = Status::Pending;
            task.progress = 0.0;
            task.bytes_downloaded = 0;
            task.error_message = None;
            task.resume_token_ref = None;
            task.started_at = None;
            task.completed_at = None;
        }
        Transition::ToPending => {
            task.status = Status::Pending;
        }
    }
    Ok(())
}

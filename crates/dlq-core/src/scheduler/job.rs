//! One running download: the attempt/retry loop for a single task, spawned
//! by the scheduler as its own `tokio::task`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::event::{JobOutcome, JobSignal};
use crate::retry::{classify, AttemptTracker, RetryDecision, RetryPolicy, TransportError};
use crate::transport::{resume_token, FetchRequest, ResumeToken, Transport, Validator};

pub struct JobContext {
    pub task_id: Uuid,
    pub url: String,
    pub dest_tmp_path: std::path::PathBuf,
    pub resume_dir: std::path::PathBuf,
    pub initial_resume: Option<ResumeToken>,
    pub transport: Arc<dyn Transport>,
    pub retry_policy: RetryPolicy,
    pub events: mpsc::UnboundedSender<JobOutcome>,
    pub signal: watch::Receiver<JobSignal>,
}

/// Runs `ctx.task_id` to completion, permanent failure, pause, or
/// cancellation, retrying transient errors per `ctx.retry_policy`. Bytes
/// downloaded so far are tracked locally so a pause can persist an accurate
/// resume token even though `Transport::fetch` only returns a terminal
/// `Result`, not a running tally.
pub async fn run_job(ctx: JobContext) {
    let mut tracker = AttemptTracker::new();
    let mut resume = ctx.initial_resume.clone();
    let last_bytes = Arc::new(AtomicI64::new(resume.as_ref().map(|r| r.next_offset).unwrap_or(0)));

    loop {
        if *ctx.signal.borrow() != JobSignal::Run {
            emit_stop(&ctx, last_bytes.load(Ordering::SeqCst), &resume);
            return;
        }

        let attempt = tracker.record_attempt(ctx.task_id);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut signal_watch = ctx.signal.clone();
        let stop_forward = stop_tx.clone();
        let stopper = tokio::spawn(async move {
            loop {
                if *signal_watch.borrow() != JobSignal::Run {
                    let _ = stop_forward.send(true);
                    return;
                }
                if signal_watch.changed().await.is_err() {
                    return;
                }
            }
        });

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let task_id = ctx.task_id;
        let events = ctx.events.clone();
        let last_bytes_fwd = last_bytes.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(ev) = progress_rx.recv().await {
                last_bytes_fwd.store(ev.bytes_downloaded, Ordering::SeqCst);
                let _ = events.send(JobOutcome::Progress {
                    task_id,
                    bytes_downloaded: ev.bytes_downloaded,
                    total_bytes: ev.total_bytes,
                });
            }
        });

        let request = FetchRequest {
            task_id: ctx.task_id,
            url: ctx.url.clone(),
            dest_tmp_path: ctx.dest_tmp_path.clone(),
            resume: resume.clone(),
        };
        let result = ctx.transport.fetch(request, progress_tx, stop_rx).await;
        stopper.abort();
        forwarder.await.ok();

        match result {
            Ok(outcome) => {
                resume_token::delete(&resume_token::path_for(&ctx.resume_dir, ctx.task_id));
                tracker.clear(ctx.task_id);
                last_bytes.store(outcome.bytes_downloaded, Ordering::SeqCst);
                let _ = ctx.events.send(JobOutcome::Completed { task_id: ctx.task_id });
                return;
            }
            Err(TransportError::Cancelled) => {
                emit_stop(&ctx, last_bytes.load(Ordering::SeqCst), &resume);
                return;
            }
            Err(err) => {
                let kind = classify(&err);
                let validator_reset_used = tracker.validator_reset_used(ctx.task_id);
                match ctx.retry_policy.decide(attempt, kind, validator_reset_used) {
                    RetryDecision::Retry { delay, reset_offset } => {
                        if reset_offset {
                            tracker.mark_validator_reset_used(ctx.task_id);
                            resume = None;
                            last_bytes.store(0, Ordering::SeqCst);
                        }
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    RetryDecision::NoRetry => {
                        let retryable = !matches!(
                            kind,
                            crate::retry::ErrorKind::HttpPermanent { .. }
                                | crate::retry::ErrorKind::Cancelled
                                | crate::retry::ErrorKind::InvalidResumeData
                        );
                        let resume_token_ref = if retryable {
                            persist_resume(&ctx, last_bytes.load(Ordering::SeqCst), &resume_validator(&resume))
                        } else {
                            resume_token::delete(&resume_token::path_for(&ctx.resume_dir, ctx.task_id));
                            None
                        };
                        let _ = ctx.events.send(JobOutcome::Failed {
                            task_id: ctx.task_id,
                            message: err.to_string(),
                            retryable,
                            resume_token_ref,
                        });
                        return;
                    }
                }
            }
        }
    }
}

fn resume_validator(resume: &Option<ResumeToken>) -> Validator {
    resume.as_ref().map(|r| r.validator.clone()).unwrap_or_default()
}

fn persist_resume(ctx: &JobContext, bytes_downloaded: i64, validator: &Validator) -> Option<std::path::PathBuf> {
    let token = ResumeToken {
        validator: validator.clone(),
        next_offset: bytes_downloaded,
    };
    resume_token::save(&ctx.resume_dir, ctx.task_id, &token).ok()
}

fn emit_stop(ctx: &JobContext, bytes_downloaded: i64, resume: &Option<ResumeToken>) {
    let signal = *ctx.signal.borrow();
    match signal {
        JobSignal::Pause => {
            let resume_token_ref = persist_resume(ctx, bytes_downloaded, &resume_validator(resume));
            let _ = ctx.events.send(JobOutcome::Paused { task_id: ctx.task_id, resume_token_ref });
        }
        JobSignal::Cancel => {
            let _ = std::fs::remove_file(&ctx.dest_tmp_path);
            resume_token::delete(&resume_token::path_for(&ctx.resume_dir, ctx.task_id));
            let _ = ctx.events.send(JobOutcome::Cancelled { task_id: ctx.task_id });
        }
        JobSignal::Run => {
            // Transport returned Cancelled without an external signal change
            // (e.g. the process is shutting down); treat like a pause so no
            // progress is lost.
            let resume_token_ref = persist_resume(ctx, bytes_downloaded, &resume_validator(resume));
            let _ = ctx.events.send(JobOutcome::Paused { task_id: ctx.task_id, resume_token_ref });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FlakyTransport {
        fail_times: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn probe(&self, _url: &str) -> Result<crate::transport::HeadResult, TransportError> {
            Ok(crate::transport::HeadResult {
                content_length: Some(10),
                accept_ranges: true,
                validator: Validator::default(),
            })
        }

        async fn fetch(
            &self,
            request: FetchRequest,
            progress: mpsc::UnboundedSender<crate::transport::TransportEvent>,
            _cancel: watch::Receiver<bool>,
        ) -> Result<crate::transport::FetchOutcome, TransportError> {
            let mut remaining = self.fail_times.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::ConnectionLost("flaky".into()));
            }
            let _ = progress.send(crate::transport::TransportEvent {
                bytes_downloaded: 10,
                total_bytes: Some(10),
            });
            std::fs::write(&request.dest_tmp_path, b"0123456789").unwrap();
            Ok(crate::transport::FetchOutcome {
                bytes_downloaded: 10,
                total_bytes: 10,
                validator: Validator::default(),
            })
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_then_completes() {
        let dir = tempfile::tempdir().unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (_sig_tx, sig_rx) = watch::channel(JobSignal::Run);
        let ctx = JobContext {
            task_id: Uuid::new_v4(),
            url: "https://host/f".into(),
            dest_tmp_path: dir.path().join("f.part"),
            resume_dir: dir.path().join("resume"),
            initial_resume: None,
            transport: Arc::new(FlakyTransport { fail_times: Mutex::new(2) }),
            retry_policy: RetryPolicy::new(5, std::time::Duration::from_millis(1), std::time::Duration::from_millis(5)),
            events: events_tx,
            signal: sig_rx,
        };
        run_job(ctx).await;

        let mut saw_completed = false;
        while let Ok(ev) = events_rx.try_recv() {
            if matches!(ev, JobOutcome::Completed { .. }) {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn permanent_failure_discards_resume_token() {
        struct AlwaysPermanent;
        #[async_trait]
        impl Transport for AlwaysPermanent {
            async fn probe(&self, _url: &str) -> Result<crate::transport::HeadResult, TransportError> {
                unreachable!()
            }
            async fn fetch(
                &self,
                _request: FetchRequest,
                _progress: mpsc::UnboundedSender<crate::transport::TransportEvent>,
                _cancel: watch::Receiver<bool>,
            ) -> Result<crate::transport::FetchOutcome, TransportError> {
                Err(TransportError::Http { status: 404, message: "not found".into() })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (_sig_tx, sig_rx) = watch::channel(JobSignal::Run);
        let ctx = JobContext {
            task_id: Uuid::new_v4(),
            url: "https://host/f".into(),
            dest_tmp_path: dir.path().join("f.part"),
            resume_dir: dir.path().join("resume"),
            initial_resume: None,
            transport: Arc::new(AlwaysPermanent),
            retry_policy: RetryPolicy::new(5, std::time::Duration::from_millis(1), std::time::Duration::from_millis(5)),
            events: events_tx,
            signal: sig_rx,
        };
        run_job(ctx).await;

        let ev = events_rx.recv().await.unwrap();
        match ev {
            JobOutcome::Failed { retryable, .. } => assert!(!retryable),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}

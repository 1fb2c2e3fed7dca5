//! End-to-end scenarios driving a real `Manager` against a fake `Transport`,
//! so no network access is needed.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use dlq_core::config::DlqConfig;
use dlq_core::manifest::ManifestEntry;
use dlq_core::network::FakeNetworkMonitor;
use dlq_core::retry::TransportError;
use dlq_core::transport::resume_token;
use dlq_core::transport::{FetchOutcome, FetchRequest, HeadResult, Transport, TransportEvent, Validator};
use dlq_core::{Manager, QueueState, Status};

fn config(base_dir: &std::path::Path, max_concurrent_downloads: usize) -> DlqConfig {
    DlqConfig {
        max_concurrent_downloads,
        max_retry_attempts: 3,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 50,
        persist_debounce_ms: 10,
        connect_timeout_secs: 5,
        stall_timeout_secs: 5,
        base_dir: base_dir.to_path_buf(),
    }
}

fn entry(category: &str, filename: &str, estimated_size: i64) -> ManifestEntry {
    ManifestEntry {
        category: category.into(),
        part_number: 1,
        total_parts: 1,
        filename: filename.into(),
        url: format!("https://host/{filename}"),
        estimated_size,
        dataset_name: "INCLUDE".into(),
    }
}

async fn wait_until(
    manager: &Manager,
    timeout: Duration,
    mut pred: impl FnMut(&QueueState) -> bool,
) -> QueueState {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let state = manager.snapshot().await.expect("manager alive");
        if pred(&state) {
            return state;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}; last state: {state:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// One scripted behavior for a single `fetch` attempt.
enum Step {
    /// Writes `bytes` to the destination, emits one progress event for the
    /// full cumulative total, and completes.
    Succeed { bytes: i64, etag: Option<String> },
    Http { status: u16, message: String },
    ValidatorChanged,
    /// Emits `emit` bytes of progress, then waits for the signal to stop and
    /// returns `Cancelled` — models a pause (or a process-killed-mid-transfer)
    /// partway through a transfer of `total` bytes.
    PauseAfter { emit: i64, total: i64 },
}

/// Replays a fixed sequence of attempt outcomes for a single task, in order.
/// Good enough for scenarios with exactly one task in flight at a time.
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn probe(&self, _url: &str) -> Result<HeadResult, TransportError> {
        Ok(HeadResult {
            content_length: None,
            accept_ranges: true,
            validator: Validator::default(),
        })
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::UnboundedSender<TransportEvent>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<FetchOutcome, TransportError> {
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("scenario requested more attempts than scripted");
        match step {
            Step::Succeed { bytes, etag } => {
                std::fs::write(&request.dest_tmp_path, vec![0u8; bytes.max(0) as usize])
                    .expect("writing fake payload");
                let _ = progress.send(TransportEvent {
                    bytes_downloaded: bytes,
                    total_bytes: Some(bytes),
                });
                Ok(FetchOutcome {
                    bytes_downloaded: bytes,
                    total_bytes: bytes,
                    validator: Validator { etag, last_modified: None },
                })
            }
            Step::Http { status, message } => Err(TransportError::Http { status, message }),
            Step::ValidatorChanged => Err(TransportError::ValidatorChanged),
            Step::PauseAfter { emit, total } => {
                let _ = progress.send(TransportEvent {
                    bytes_downloaded: emit,
                    total_bytes: Some(total),
                });
                loop {
                    if *cancel.borrow() {
                        break;
                    }
                    if cancel.changed().await.is_err() {
                        break;
                    }
                }
                Err(TransportError::Cancelled)
            }
        }
    }
}

/// Always succeeds after a fixed delay, regardless of task id — used to
/// exercise the concurrency cap with many simultaneous tasks.
struct UniformDelayTransport {
    delay: Duration,
    bytes: i64,
}

#[async_trait]
impl Transport for UniformDelayTransport {
    async fn probe(&self, _url: &str) -> Result<HeadResult, TransportError> {
        Ok(HeadResult { content_length: None, accept_ranges: true, validator: Validator::default() })
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::UnboundedSender<TransportEvent>,
        _cancel: watch::Receiver<bool>,
    ) -> Result<FetchOutcome, TransportError> {
        tokio::time::sleep(self.delay).await;
        std::fs::write(&request.dest_tmp_path, vec![0u8; self.bytes.max(0) as usize])
            .expect("writing fake payload");
        let _ = progress.send(TransportEvent { bytes_downloaded: self.bytes, total_bytes: Some(self.bytes) });
        Ok(FetchOutcome { bytes_downloaded: self.bytes, total_bytes: self.bytes, validator: Validator::default() })
    }
}

#[tokio::test]
async fn s1_minimal_end_to_end_completes() {
    let dir = tempfile::tempdir().unwrap();
    let transport = std::sync::Arc::new(ScriptedTransport::new(vec![Step::Succeed {
        bytes: 1_000,
        etag: None,
    }]));
    let monitor = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager = Manager::start_with(config(dir.path(), 3), transport, monitor).unwrap();

    manager
        .load_manifest(vec![entry("Seasons", "Seasons.zip", 1_000)])
        .unwrap();
    manager.start_queue().unwrap();

    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().all(|t| t.status == Status::Completed)
    })
    .await;

    let task = &state.tasks[0];
    assert_eq!(task.progress, 1.0);
    assert_eq!(task.bytes_downloaded, 1_000);
    assert!(task.completed_at.is_some());

    let resume_dir = config(dir.path(), 3).resume_dir();
    assert!(!resume_token::path_for(&resume_dir, task.id).exists());
}

#[tokio::test]
async fn s2_pause_resume_round_trip_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 3);

    let transport = std::sync::Arc::new(ScriptedTransport::new(vec![
        Step::PauseAfter { emit: 500, total: 1_000 },
        Step::Succeed { bytes: 1_000, etag: None },
    ]));
    let monitor = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager = Manager::start_with(cfg.clone(), transport, monitor).unwrap();

    manager
        .load_manifest(vec![entry("Animals", "Animals.zip", 1_000)])
        .unwrap();
    manager.start_queue().unwrap();

    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().any(|t| t.bytes_downloaded >= 500)
    })
    .await;
    let id = state.tasks[0].id;

    manager.pause(id).unwrap();
    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().any(|t| t.status == Status::Paused)
    })
    .await;
    assert_eq!(state.tasks[0].status, Status::Paused);
    assert!(resume_token::path_for(&cfg.resume_dir(), id).exists());

    manager.shutdown().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Simulate a process restart: a fresh Manager loads the same on-disk
    // state and resume token.
    let transport2 = std::sync::Arc::new(ScriptedTransport::new(vec![Step::Succeed {
        bytes: 1_000,
        etag: None,
    }]));
    let monitor2 = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager2 = Manager::start_with(cfg.clone(), transport2, monitor2).unwrap();

    let reloaded = manager2.snapshot().await.unwrap();
    let reloaded_task = reloaded.tasks.iter().find(|t| t.id == id).unwrap();
    assert_eq!(reloaded_task.status, Status::Paused);
    assert!(reloaded_task.resume_token_ref.is_some());

    manager2.resume(id).unwrap();
    let state = wait_until(&manager2, Duration::from_secs(5), |s| {
        s.tasks.iter().any(|t| t.status == Status::Completed)
    })
    .await;
    assert_eq!(state.tasks[0].bytes_downloaded, 1_000);
}

#[tokio::test]
async fn s3_concurrency_cap_never_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let transport = std::sync::Arc::new(UniformDelayTransport {
        delay: Duration::from_millis(30),
        bytes: 100,
    });
    let monitor = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager = Manager::start_with(config(dir.path(), 3), transport, monitor).unwrap();

    let entries: Vec<ManifestEntry> = (0..10)
        .map(|i| entry("Bulk", &format!("part-{i}.zip"), 100))
        .collect();
    manager.load_manifest(entries).unwrap();
    manager.start_queue().unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = manager.snapshot().await.unwrap();
        assert!(state.active_count() <= 3, "active_count exceeded cap: {}", state.active_count());
        if state.tasks.iter().all(|t| t.status == Status::Completed) {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("tasks did not all complete in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn s4_transient_503_is_retried_then_completes() {
    let dir = tempfile::tempdir().unwrap();
    let transport = std::sync::Arc::new(ScriptedTransport::new(vec![
        Step::Http { status: 503, message: "Service Unavailable".into() },
        Step::Succeed { bytes: 1_000, etag: None },
    ]));
    let monitor = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager = Manager::start_with(config(dir.path(), 3), transport, monitor).unwrap();

    manager.load_manifest(vec![entry("Seasons", "Seasons.zip", 1_000)]).unwrap();
    manager.start_queue().unwrap();

    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().all(|t| t.status == Status::Completed)
    })
    .await;
    assert_eq!(state.tasks[0].bytes_downloaded, 1_000);
}

#[tokio::test]
async fn s5_permanent_404_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 3);
    let transport = std::sync::Arc::new(ScriptedTransport::new(vec![Step::Http {
        status: 404,
        message: "Not Found".into(),
    }]));
    let monitor = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager = Manager::start_with(cfg.clone(), transport, monitor).unwrap();

    manager.load_manifest(vec![entry("Seasons", "Seasons.zip", 1_000)]).unwrap();
    manager.start_queue().unwrap();

    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().all(|t| t.status == Status::Failed)
    })
    .await;
    let task = &state.tasks[0];
    assert!(task.error_message.as_deref().unwrap().contains("Not Found"));
    assert!(!resume_token::path_for(&cfg.resume_dir(), task.id).exists());
}

#[tokio::test]
async fn s6_validator_change_resets_once_then_fails_on_second_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), 3);
    let transport = std::sync::Arc::new(ScriptedTransport::new(vec![
        Step::PauseAfter { emit: 500, total: 1_000 },
        Step::ValidatorChanged,
        Step::ValidatorChanged,
    ]));
    let monitor = std::sync::Arc::new(FakeNetworkMonitor::new(true));
    let manager = Manager::start_with(cfg, transport, monitor).unwrap();

    manager.load_manifest(vec![entry("Seasons", "Seasons.zip", 1_000)]).unwrap();
    manager.start_queue().unwrap();

    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().any(|t| t.bytes_downloaded >= 500)
    })
    .await;
    let id = state.tasks[0].id;
    manager.pause(id).unwrap();
    wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().any(|t| t.status == Status::Paused)
    })
    .await;

    manager.resume(id).unwrap();
    let state = wait_until(&manager, Duration::from_secs(5), |s| {
        s.tasks.iter().any(|t| t.status == Status::Failed)
    })
    .await;
    let task = &state.tasks[0];
    assert!(task.error_message.as_deref().unwrap().contains("resource changed"));
}

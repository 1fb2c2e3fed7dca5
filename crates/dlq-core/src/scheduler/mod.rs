//! The event loop: one `tokio::task` serializing all mutation. It owns the
//! [`crate::queue::TaskQueue`] and processes
//! [`Command`]s and job outcomes one at a time; every other task (CLI
//! handlers, running jobs) only ever talks to it through a channel.

pub mod event;
mod job;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

pub use event::Command;
use event::{JobOutcome, JobSignal};

use crate::aggregator::Aggregator;
use crate::config::DlqConfig;
use crate::lifecycle::{self, Transition};
use crate::network::NetworkMonitor;
use crate::persistence::{self, Debouncer};
use crate::queue::TaskQueue;
use crate::queue_state::QueueState;
use crate::retry::RetryPolicy;
use crate::storage;
use crate::task::Status;
use crate::transport::{resume_token, Transport};

struct JobHandle {
    signal_tx: watch::Sender<JobSignal>,
    join: tokio::task::JoinHandle<()>,
}

/// Owns all mutable state and runs until a [`Command::Shutdown`] is
/// received or every `Command` sender is dropped.
pub struct Scheduler {
    config: DlqConfig,
    queue: TaskQueue,
    aggregator: Aggregator,
    retry_policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    network_monitor: Arc<dyn NetworkMonitor>,
    debouncer: Debouncer,
    jobs: HashMap<Uuid, JobHandle>,
    /// Ids currently paused because the network monitor reported it
    /// unavailable, so `on_tick` can tell them apart from a user pause and
    /// move them back to pending once the network returns.
    paused_by_network: HashSet<Uuid>,
    commands: mpsc::UnboundedReceiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<JobOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<JobOutcome>,
    snapshots: broadcast::Sender<QueueState>,
}

impl Scheduler {
    pub fn new(
        config: DlqConfig,
        initial_state: QueueState,
        transport: Arc<dyn Transport>,
        network_monitor: Arc<dyn NetworkMonitor>,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshots: broadcast::Sender<QueueState>,
    ) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let retry_policy = RetryPolicy::new(
            config.max_retry_attempts,
            config.retry_base_delay(),
            config.retry_max_delay(),
        );
        let debounce = config.persist_debounce();
        Self {
            config,
            queue: TaskQueue::from_state(initial_state),
            aggregator: Aggregator::new(),
            retry_policy,
            transport,
            network_monitor,
            debouncer: Debouncer::new(debounce),
            jobs: HashMap::new(),
            paused_by_network: HashSet::new(),
            commands,
            outcomes_tx,
            outcomes_rx,
            snapshots,
        }
    }

    /// Drives the loop. Returns when a `Shutdown` command is received (or
    /// the command channel closes), after a final synchronous save and an
    /// abort of any still-running job tasks.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(250));
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                Some(outcome) = self.outcomes_rx.recv() => {
                    self.handle_outcome(outcome);
                }
                _ = tick.tick() => {
                    self.on_tick().await;
                }
            }
        }
        self.save_now();
        for (_, handle) in self.jobs.drain() {
            handle.join.abort();
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::LoadManifest { entries } => {
                for entry in entries {
                    if entry.validate().is_ok() {
                        self.queue.enqueue(crate::task::DownloadTask::new(&entry));
                    }
                }
                self.mark_dirty_and_pump();
            }
            Command::Start => {
                self.queue.set_paused(false);
                self.mark_dirty_and_pump();
            }
            Command::PauseAll => {
                self.queue.set_paused(true);
                let ids: Vec<Uuid> = self
                    .queue
                    .all()
                    .into_iter()
                    .filter(|t| t.status.can_pause())
                    .map(|t| t.id)
                    .collect();
                for id in ids {
                    self.pause_one(id);
                }
                self.mark_dirty();
            }
            Command::ResumeAll => {
                self.queue.set_paused(false);
                let ids: Vec<Uuid> = self.queue.by_status(Status::Paused).into_iter().map(|t| t.id).collect();
                for id in ids {
                    self.attempt_start(id);
                }
                self.mark_dirty_and_pump();
            }
            Command::RetryFailed => {
                let ids: Vec<Uuid> = self.queue.by_status(Status::Failed).into_iter().map(|t| t.id).collect();
                for id in ids {
                    self.attempt_start(id);
                }
                self.mark_dirty_and_pump();
            }
            Command::Clear => {
                let ids: Vec<Uuid> = self.queue.all().into_iter().map(|t| t.id).collect();
                for id in ids {
                    self.cancel_one(id);
                }
                self.queue.clear();
                self.mark_dirty();
            }
            Command::Pause(id) => {
                self.pause_one(id);
                self.mark_dirty();
            }
            Command::Resume(id) => {
                self.attempt_start(id);
                self.mark_dirty();
            }
            Command::Cancel(id) => {
                if self.jobs.contains_key(&id) {
                    // Teardown finishes asynchronously; `JobOutcome::Cancelled`
                    // does the discard_tmp/remove once the job task exits.
                    self.cancel_one(id);
                } else {
                    storage::discard_tmp(&self.config, id);
                    resume_token::delete(&resume_token::path_for(&self.config.resume_dir(), id));
                    self.aggregator.forget(id);
                    self.queue.remove(id);
                }
                self.mark_dirty();
            }
            Command::Retry(id) => {
                self.attempt_start(id);
                self.mark_dirty();
            }
            Command::Prioritize(id) => {
                self.queue.prioritize(id);
                self.mark_dirty();
            }
            Command::Remove(id) => {
                self.stop_job(id, JobSignal::Cancel);
                storage::discard_tmp(&self.config, id);
                resume_token::delete(&resume_token::path_for(&self.config.resume_dir(), id));
                self.aggregator.forget(id);
                self.queue.remove(id);
                self.mark_dirty();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.queue.state().clone());
            }
            Command::Shutdown => unreachable!("handled in run()"),
        }
    }

    fn handle_outcome(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Progress { task_id, bytes_downloaded, total_bytes } => {
                self.queue.update(task_id, |t| {
                    if let Some(total) = total_bytes {
                        t.total_bytes = t.total_bytes.max(total);
                    }
                    t.set_bytes_downloaded(bytes_downloaded);
                });
                self.aggregator.record_progress(task_id, Instant::now(), bytes_downloaded);
            }
            JobOutcome::Completed { task_id } => {
                self.jobs.remove(&task_id);
                self.apply_transition(task_id, Transition::ToExtracting);
                let filename = self.queue.get(task_id).map(|t| t.filename.clone());
                if let Some(filename) = filename {
                    if storage::finalize(&self.config, task_id, &filename).is_ok() {
                        self.apply_transition(task_id, Transition::ToCompleted);
                    } else {
                        self.apply_transition(
                            task_id,
                            Transition::ToFailed {
                                message: "failed to finalize downloaded file".into(),
                                retry_token_kept: false,
                            },
                        );
                    }
                }
                self.aggregator.forget(task_id);
                self.mark_dirty();
                self.pump();
            }
            JobOutcome::Paused { task_id, resume_token_ref } => {
                self.jobs.remove(&task_id);
                self.queue.update(task_id, |t| t.resume_token_ref = resume_token_ref);
                self.apply_transition(task_id, Transition::ToPaused);
                self.mark_dirty();
            }
            JobOutcome::Cancelled { task_id } => {
                self.jobs.remove(&task_id);
                storage::discard_tmp(&self.config, task_id);
                resume_token::delete(&resume_token::path_for(&self.config.resume_dir(), task_id));
                self.aggregator.forget(task_id);
                self.queue.remove(task_id);
                self.mark_dirty();
                self.pump();
            }
            JobOutcome::Failed { task_id, message, retryable, resume_token_ref } => {
                self.jobs.remove(&task_id);
                self.queue.update(task_id, |t| t.resume_token_ref = resume_token_ref);
                self.apply_transition(
                    task_id,
                    Transition::ToFailed { message, retry_token_kept: retryable },
                );
                self.aggregator.forget(task_id);
                self.mark_dirty();
                self.pump();
            }
        }
    }

    /// Best-effort; illegal transitions are logged by `lifecycle::apply` and
    /// otherwise ignored here (a scheduler race, not a user error).
    fn apply_transition(&mut self, task_id: Uuid, transition: Transition) {
        self.queue.update(task_id, move |t| {
            let _ = lifecycle::apply(t, transition);
        });
    }

    fn pause_one(&mut self, id: Uuid) {
        self.stop_job(id, JobSignal::Pause);
    }

    fn cancel_one(&mut self, id: Uuid) {
        self.stop_job(id, JobSignal::Cancel);
    }

    /// Starts `id` right now if there's spare concurrency and it's in a
    /// startable state (pending, paused, or failed); otherwise it's left
    /// untouched; a paused/failed task that loses this race stays paused or
    /// failed until the next explicit `Resume`/`Retry`/`ResumeAll`/
    /// `RetryFailed` command, it is not auto-retried by the background pump.
    fn attempt_start(&mut self, id: Uuid) {
        if self.queue.is_paused() {
            return;
        }
        if self.queue.active_count() >= self.queue.max_concurrent_downloads() {
            return;
        }
        let Some(task) = self.queue.get(id) else { return };
        if !task.status.can_start() {
            return;
        }
        self.spawn_job(id);
    }

    fn stop_job(&mut self, id: Uuid, signal: JobSignal) {
        if let Some(handle) = self.jobs.get(&id) {
            let _ = handle.signal_tx.send(signal);
        }
    }

    async fn on_tick(&mut self) {
        let available = self.network_monitor.is_available().await;
        self.queue.set_network_available(available);

        if !available && !self.queue.is_paused() {
            tracing::warn!("network unavailable, pausing active downloads");
            let ids: Vec<Uuid> = self.queue.by_status(Status::Downloading).into_iter().map(|t| t.id).collect();
            for id in ids {
                self.pause_one(id);
                self.paused_by_network.insert(id);
            }
        } else if available && !self.paused_by_network.is_empty() {
            tracing::info!("network restored, re-queuing network-paused downloads");
            for id in self.paused_by_network.drain() {
                self.apply_transition(id, Transition::ToPending);
            }
        }

        self.pump();
        if self.debouncer.due(Instant::now()) {
            self.save_now();
        }
    }

    fn mark_dirty(&mut self) {
        self.debouncer.mark_dirty(Instant::now());
    }

    fn mark_dirty_and_pump(&mut self) {
        self.mark_dirty();
        self.pump();
    }

    fn save_now(&mut self) {
        let hash = persistence::content_hash(self.queue.state());
        if self.debouncer.unchanged_since_last_save(hash) {
            self.debouncer.mark_saved();
        } else if persistence::save_now(&self.config.state_file(), self.queue.state()).is_ok() {
            self.debouncer.mark_saved_with_hash(hash);
        }
        let _ = self.snapshots.send(self.queue.state().clone());
    }

    /// Spawns jobs for as many pending tasks as `next_pending` yields,
    /// i.e. up to the concurrency cap.
    fn pump(&mut self) {
        while let Some(id) = self.queue.next_pending() {
            self.spawn_job(id);
        }
    }

    fn spawn_job(&mut self, task_id: Uuid) {
        let Some(task) = self.queue.get(task_id) else { return };
        let url = task.url.clone();
        let resume_dir = self.config.resume_dir();
        let resume_path = resume_token::path_for(&resume_dir, task_id);
        let initial_resume = resume_token::load(&resume_path).ok();

        let (signal_tx, signal_rx) = watch::channel(JobSignal::Run);
        let ctx = job::JobContext {
            task_id,
            url,
            dest_tmp_path: storage::tmp_path(&self.config, task_id),
            resume_dir,
            initial_resume,
            transport: self.transport.clone(),
            retry_policy: self.retry_policy.clone(),
            events: self.outcomes_tx.clone(),
            signal: signal_rx,
        };
        self.apply_transition(task_id, Transition::ToQueued);
        self.apply_transition(task_id, Transition::ToDownloading);
        let join = tokio::spawn(job::run_job(ctx));
        self.jobs.insert(task_id, JobHandle { signal_tx, join });
    }
}

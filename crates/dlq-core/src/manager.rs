//! Public facade: the only type callers (CLI commands, embedders) construct
//! directly. Wraps the [`crate::scheduler::Scheduler`] event loop running on
//! its own `tokio::task`, talking to it over a command channel — the thing
//! callers hold is kept separate from the thing that owns state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::config::DlqConfig;
use crate::manifest::ManifestEntry;
use crate::network::{NetworkMonitor, TcpProbeMonitor};
use crate::persistence;
use crate::queue_state::QueueState;
use crate::scheduler::{Command, Scheduler};
use crate::transport::{HttpTransport, Transport};

/// Handle to a running engine. Cloning shares the same underlying
/// scheduler task; dropping the last handle does not stop it — call
/// [`Manager::shutdown`] explicitly.
#[derive(Clone)]
pub struct Manager {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: broadcast::Sender<QueueState>,
}

impl Manager {
    /// Loads persisted queue state (if any), builds the default
    /// `reqwest`-backed transport and TCP-probe network monitor, and spawns
    /// the scheduler's event loop.
    pub async fn start(config: DlqConfig) -> Result<Self> {
        let transport = Arc::new(
            HttpTransport::new(
                Duration::from_secs(config.connect_timeout_secs),
                Duration::from_secs(config.stall_timeout_secs),
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        );
        let monitor = Arc::new(TcpProbeMonitor::default());
        Self::start_with(config, transport, monitor)
    }

    /// Builds the engine against a caller-supplied Transport/NetworkMonitor,
    /// the seam integration tests use to run without real network access.
    pub fn start_with(
        config: DlqConfig,
        transport: Arc<dyn Transport>,
        network_monitor: Arc<dyn NetworkMonitor>,
    ) -> Result<Self> {
        std::fs::create_dir_all(config.state_dir()).context("creating state dir")?;
        let initial_state =
            persistence::load_or_default(&config.state_file(), config.max_concurrent_downloads);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, _) = broadcast::channel(16);

        let scheduler = Scheduler::new(
            config,
            initial_state,
            transport,
            network_monitor,
            commands_rx,
            snapshots_tx.clone(),
        );
        tokio::spawn(scheduler.run());

        Ok(Self {
            commands: commands_tx,
            snapshots: snapshots_tx,
        })
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("scheduler event loop has shut down"))
    }

    pub fn load_manifest(&self, entries: Vec<ManifestEntry>) -> Result<()> {
        self.send(Command::LoadManifest { entries })
    }

    pub fn start_queue(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn pause_all(&self) -> Result<()> {
        self.send(Command::PauseAll)
    }

    pub fn resume_all(&self) -> Result<()> {
        self.send(Command::ResumeAll)
    }

    pub fn retry_failed(&self) -> Result<()> {
        self.send(Command::RetryFailed)
    }

    pub fn clear(&self) -> Result<()> {
        self.send(Command::Clear)
    }

    pub fn pause(&self, id: Uuid) -> Result<()> {
        self.send(Command::Pause(id))
    }

    pub fn resume(&self, id: Uuid) -> Result<()> {
        self.send(Command::Resume(id))
    }

    pub fn cancel(&self, id: Uuid) -> Result<()> {
        self.send(Command::Cancel(id))
    }

    pub fn retry(&self, id: Uuid) -> Result<()> {
        self.send(Command::Retry(id))
    }

    pub fn prioritize(&self, id: Uuid) -> Result<()> {
        self.send(Command::Prioritize(id))
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        self.send(Command::Remove(id))
    }

    /// Point-in-time copy of the queue, fetched by round-tripping through
    /// the event loop so it reflects a fully-applied state (no torn reads).
    pub async fn snapshot(&self) -> Result<QueueState> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.context("scheduler dropped the snapshot reply")
    }

    /// A live feed of snapshots, pushed after every save (on each debounce
    /// tick and on shutdown). Used by `dlq status --watch`.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueState> {
        self.snapshots.subscribe()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

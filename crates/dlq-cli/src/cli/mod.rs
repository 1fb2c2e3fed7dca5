//! CLI for the `dlq` download queue.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlq_core::config;
use uuid::Uuid;

use commands::{
    run_cancel, run_clear, run_load, run_pause, run_prioritize, run_remove, run_resume,
    run_retry, run_retry_failed, run_start, run_status,
};

#[derive(Debug, Parser)]
#[command(name = "dlq")]
#[command(about = "Resumable, concurrent download queue for multi-part dataset archives", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Parse a manifest file and enqueue its entries.
    Load {
        /// Path to a JSON array of manifest entries.
        manifest: std::path::PathBuf,
        /// Dataset name recorded against every loaded entry.
        #[arg(long)]
        dataset: String,
    },

    /// Unpause the queue and start picking up pending tasks.
    Start,

    /// Pause a task by id, or every active task if no id is given.
    Pause {
        /// Task identifier. Omit to pause the whole queue.
        id: Option<Uuid>,
    },

    /// Resume a task by id, or every paused task if no id is given.
    Resume {
        /// Task identifier. Omit to resume the whole queue.
        id: Option<Uuid>,
    },

    /// Retry a single failed task.
    Retry {
        /// Task identifier.
        id: Uuid,
    },

    /// Retry every failed task.
    RetryFailed,

    /// Cancel a task, discarding its partial progress.
    Cancel {
        /// Task identifier.
        id: Uuid,
    },

    /// Move a task to the front of the pending queue.
    Prioritize {
        /// Task identifier.
        id: Uuid,
    },

    /// Remove a task and its on-disk temp/resume files.
    Remove {
        /// Task identifier.
        id: Uuid,
    },

    /// Remove every task and its on-disk temp/resume files.
    Clear,

    /// Print the current queue snapshot.
    Status {
        /// Keep printing snapshots until every task reaches a terminal state.
        #[arg(long)]
        watch: bool,
    },
}

impl CliCommand {
    /// Parses argv, runs the matching handler, and returns the process exit
    /// code: 0 all complete, 1 partial success (some failed), 2 configuration
    /// error, 130 cancelled.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let manager = dlq_core::Manager::start(cfg).await?;

        let code = match cli.command {
            CliCommand::Load { manifest, dataset } => run_load(&manager, &manifest, &dataset).await?,
            CliCommand::Start => run_start(&manager).await?,
            CliCommand::Pause { id } => run_pause(&manager, id).await?,
            CliCommand::Resume { id } => run_resume(&manager, id).await?,
            CliCommand::Retry { id } => run_retry(&manager, id).await?,
            CliCommand::RetryFailed => run_retry_failed(&manager).await?,
            CliCommand::Cancel { id } => run_cancel(&manager, id).await?,
            CliCommand::Prioritize { id } => run_prioritize(&manager, id).await?,
            CliCommand::Remove { id } => run_remove(&manager, id).await?,
            CliCommand::Clear => run_clear(&manager).await?,
            CliCommand::Status { watch } => run_status(&manager, watch).await?,
        };

        manager.shutdown()?;
        Ok(code)
    }
}

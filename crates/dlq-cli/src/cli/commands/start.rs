//! `dlq start` – unpause the queue.

use anyhow::Result;
use dlq_core::Manager;

pub async fn run_start(manager: &Manager) -> Result<i32> {
    manager.start_queue()?;
    println!("queue started");
    Ok(0)
}

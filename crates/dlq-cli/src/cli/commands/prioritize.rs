//! `dlq prioritize <id>` – move a task to the front of the pending queue.

use anyhow::Result;
use dlq_core::Manager;
use uuid::Uuid;

pub async fn run_prioritize(manager: &Manager, id: Uuid) -> Result<i32> {
    manager.prioritize(id)?;
    println!("prioritized {id}");
    Ok(0)
}

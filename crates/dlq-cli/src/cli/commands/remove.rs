//! `dlq remove <id>` – remove a task and its on-disk temp/resume files.

use anyhow::Result;
use dlq_core::Manager;
use uuid::Uuid;

pub async fn run_remove(manager: &Manager, id: Uuid) -> Result<i32> {
    manager.remove(id)?;
    println!("removed {id}");
    Ok(0)
}

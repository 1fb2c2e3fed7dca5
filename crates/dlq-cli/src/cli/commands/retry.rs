//! `dlq retry <id>` – retry a single failed task.

use anyhow::Result;
use dlq_core::Manager;
use uuid::Uuid;

pub async fn run_retry(manager: &Manager, id: Uuid) -> Result<i32> {
    manager.retry(id)?;
    println!("retrying {id}");
    Ok(0)
}

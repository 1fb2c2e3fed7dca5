//! `dlq cancel <id>` – cancel a task, discarding partial progress.

use anyhow::Result;
use dlq_core::Manager;
use uuid::Uuid;

pub async fn run_cancel(manager: &Manager, id: Uuid) -> Result<i32> {
    manager.cancel(id)?;
    println!("cancelled {id}");
    Ok(0)
}

//! `dlq retry-failed` – retry every failed task.

use anyhow::Result;
use dlq_core::Manager;

pub async fn run_retry_failed(manager: &Manager) -> Result<i32> {
    manager.retry_failed()?;
    println!("retrying failed tasks");
    Ok(0)
}

//! `dlq clear` – remove every task and its on-disk files.

use anyhow::Result;
use dlq_core::Manager;

pub async fn run_clear(manager: &Manager) -> Result<i32> {
    manager.clear()?;
    println!("queue cleared");
    Ok(0)
}

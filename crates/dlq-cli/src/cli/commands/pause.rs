//! `dlq pause [id]` – pause one task, or the whole queue if no id is given.

use anyhow::Result;
use dlq_core::Manager;
use uuid::Uuid;

pub async fn run_pause(manager: &Manager, id: Option<Uuid>) -> Result<i32> {
    match id {
        Some(id) => {
            manager.pause(id)?;
            println!("paused {id}");
        }
        None => {
            manager.pause_all()?;
            println!("paused queue");
        }
    }
    Ok(0)
}

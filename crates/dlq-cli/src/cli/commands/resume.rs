//! `dlq resume [id]` – resume one task, or the whole queue if no id is given.

use anyhow::Result;
use dlq_core::Manager;
use uuid::Uuid;

pub async fn run_resume(manager: &Manager, id: Option<Uuid>) -> Result<i32> {
    match id {
        Some(id) => {
            manager.resume(id)?;
            println!("resumed {id}");
        }
        None => {
            manager.resume_all()?;
            println!("resumed queue");
        }
    }
    Ok(0)
}

//! `dlq status [--watch]` – print the queue snapshot, optionally following
//! it until every task reaches a terminal state.

use anyhow::Result;
use dlq_core::aggregator::format_bytes;
use dlq_core::{Manager, QueueState};

pub async fn run_status(manager: &Manager, watch: bool) -> Result<i32> {
    if !watch {
        let state = manager.snapshot().await?;
        print_snapshot(&state);
        return Ok(super::exit_code_for(&state));
    }

    let mut rx = manager.subscribe();
    let mut state = manager.snapshot().await?;
    print_snapshot(&state);

    loop {
        if state.tasks.iter().all(|t| t.status.is_terminal()) {
            return Ok(super::exit_code_for(&state));
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("cancelled");
                return Ok(130);
            }
            update = rx.recv() => {
                match update {
                    Ok(next) => {
                        state = next;
                        print_snapshot(&state);
                    }
                    Err(_) => return Ok(super::exit_code_for(&state)),
                }
            }
        }
    }
}

fn print_snapshot(state: &QueueState) {
    println!(
        "paused={} network={} active={} pending={} failed={}",
        state.is_paused,
        state.is_network_available,
        state.active_count(),
        state.pending_count(),
        state.failed_count(),
    );
    for group in state.grouped_by_category() {
        println!(
            "  {:<16} {:>6.1}%  {}/{}  {:?}",
            group.category,
            group.weighted_progress() * 100.0,
            format_bytes(group.bytes_downloaded()),
            format_bytes(group.total_bytes()),
            group.overall_status(),
        );
    }
}

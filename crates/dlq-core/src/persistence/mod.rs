//! Atomic, debounced persistence of `QueueState` to `state/download_queue.json`.

mod debounce;

pub use debounce::Debouncer;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::queue_state::QueueState;

/// Cheap content digest of a serialized `QueueState`, used to skip a save
/// when nothing has actually changed since the last one.
pub fn content_hash(state: &QueueState) -> u64 {
    let json = serde_json::to_vec(state).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    hasher.finish()
}

/// `.bak` sibling of the primary state file, written right before each
/// overwrite so a crash mid-write never loses the previous good snapshot.
fn backup_path(state_file: &Path) -> PathBuf {
    let mut p = state_file.as_os_str().to_owned();
    p.push(".bak");
    PathBuf::from(p)
}

/// Writes `state` to `state_file` atomically: serialize to a sibling `.tmp`
/// file, fsync isn't available portably through std so we rely on rename's
/// atomicity within a filesystem, then rename over the target. The previous
/// contents (if any) are preserved as `.bak` first.
pub fn save_now(state_file: &Path, state: &QueueState) -> Result<()> {
    if let Some(parent) = state_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating state dir {}", parent.display()))?;
    }

    if state_file.exists() {
        std::fs::copy(state_file, backup_path(state_file)).with_context(|| {
            format!("backing up {} before overwrite", state_file.display())
        })?;
    }

    let json = serde_json::to_string_pretty(state).context("serializing queue state")?;
    let tmp_path = {
        let mut p = state_file.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    };
    std::fs::write(&tmp_path, &json)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, state_file)
        .with_context(|| format!("renaming into {}", state_file.display()))?;
    Ok(())
}

/// Loads `state_file`, repairing dangling `queue_order` entries (ids with no
/// matching task) rather than rejecting the whole snapshot. Falls back to
/// `.bak` if the primary file is missing or fails to parse; returns a fresh
/// empty `QueueState` if neither is usable.
pub fn load_or_default(state_file: &Path, max_concurrent_downloads: usize) -> QueueState {
    if let Some(state) = try_load(state_file) {
        return repair(state);
    }
    let backup = backup_path(state_file);
    if let Some(state) = try_load(&backup) {
        tracing::warn!(path = %state_file.display(), "primary queue state unreadable, recovered from .bak");
        return repair(state);
    }
    tracing::info!(path = %state_file.display(), "no usable queue state found, starting empty");
    QueueState::new(max_concurrent_downloads)
}

fn try_load(path: &Path) -> Option<QueueState> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Drops any `queue_order` id with no matching task and any task whose id
/// doesn't appear in `queue_order`, restoring `QueueState::is_consistent`.
fn repair(mut state: QueueState) -> QueueState {
    let task_ids: std::collections::HashSet<_> = state.tasks.iter().map(|t| t.id).collect();
    state.queue_order.retain(|id| task_ids.contains(id));
    let order_ids: std::collections::HashSet<_> = state.queue_order.iter().copied().collect();
    state.tasks.retain(|t| order_ids.contains(&t.id));
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;
    use crate::task::DownloadTask;

    fn entry() -> ManifestEntry {
        ManifestEntry {
            category: "A".into(),
            part_number: 1,
            total_parts: 1,
            filename: "f.zip".into(),
            url: "https://host/f.zip".into(),
            estimated_size: 10,
            dataset_name: "d".into(),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state").join("download_queue.json");
        let mut state = QueueState::new(3);
        let task = DownloadTask::new(&entry());
        state.queue_order.push(task.id);
        state.tasks.push(task);

        save_now(&state_file, &state).unwrap();
        let loaded = load_or_default(&state_file, 3);
        assert_eq!(loaded.tasks.len(), 1);
        assert!(loaded.is_consistent());
    }

    #[test]
    fn save_writes_backup_of_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");
        save_now(&state_file, &QueueState::new(1)).unwrap();
        let mut second = QueueState::new(2);
        second.is_paused = true;
        save_now(&state_file, &second).unwrap();

        assert!(backup_path(&state_file).exists());
        let backed_up: QueueState =
            serde_json::from_str(&std::fs::read_to_string(backup_path(&state_file)).unwrap()).unwrap();
        assert_eq!(backed_up.max_concurrent_downloads, 1);
    }

    #[test]
    fn corrupt_primary_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");
        save_now(&state_file, &QueueState::new(5)).unwrap();
        save_now(&state_file, &QueueState::new(5)).unwrap(); // now .bak exists too
        std::fs::write(&state_file, "{not json").unwrap();

        let loaded = load_or_default(&state_file, 1);
        assert_eq!(loaded.max_concurrent_downloads, 5);
    }

    #[test]
    fn missing_files_yield_fresh_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("nope").join("state.json");
        let loaded = load_or_default(&state_file, 7);
        assert_eq!(loaded.max_concurrent_downloads, 7);
        assert!(loaded.tasks.is_empty());
    }

    #[test]
    fn content_hash_is_stable_for_equal_states() {
        let state = QueueState::new(3);
        assert_eq!(content_hash(&state), content_hash(&state.clone()));
    }

    #[test]
    fn content_hash_changes_when_state_changes() {
        let mut a = QueueState::new(3);
        let b_before = content_hash(&a);
        a.is_paused = true;
        assert_ne!(content_hash(&a), b_before);
    }

    #[test]
    fn dangling_queue_order_entries_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");
        let mut state = QueueState::new(3);
        state.queue_order.push(uuid::Uuid::new_v4());
        std::fs::create_dir_all(state_file.parent().unwrap()).unwrap();
        std::fs::write(&state_file, serde_json::to_string(&state).unwrap()).unwrap();

        let loaded = load_or_default(&state_file, 3);
        assert!(loaded.is_consistent());
        assert!(loaded.queue_order.is_empty());
    }
}

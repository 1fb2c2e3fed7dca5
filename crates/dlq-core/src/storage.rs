//! Filesystem layout under `downloads/{tmp,completed,resume}` and the
//! atomic rename that finalizes a completed task: `.part` is renamed to its
//! final name only once the transfer completes.

use std::path::PathBuf;
use uuid::Uuid;

use crate::config::DlqConfig;
use crate::retry::TransportError;

pub fn tmp_path(config: &DlqConfig, task_id: Uuid) -> PathBuf {
    config.tmp_dir().join(format!("{task_id}.part"))
}

pub fn completed_path(config: &DlqConfig, task_id: Uuid, filename: &str) -> PathBuf {
    config.completed_dir().join(format!("{task_id}_{filename}"))
}

/// Moves the finished temp file into `completed/`, creating the directory
/// if needed. Rename is atomic within a filesystem; across filesystems (e.g.
/// `tmp_dir`/`completed_dir` on different mounts) std falls back to a
/// copy+remove, which this does not attempt to make atomic itself.
pub fn finalize(config: &DlqConfig, task_id: Uuid, filename: &str) -> Result<PathBuf, TransportError> {
    let from = tmp_path(config, task_id);
    let to = completed_path(config, task_id, filename);
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TransportError::DiskIo(e.to_string()))?;
    }
    std::fs::rename(&from, &to).map_err(|e| TransportError::DiskIo(e.to_string()))?;
    Ok(to)
}

/// Removes a task's temp file, e.g. after a permanent failure or explicit
/// removal. Missing files are not an error.
pub fn discard_tmp(config: &DlqConfig, task_id: Uuid) {
    let _ = std::fs::remove_file(tmp_path(config, task_id));
}

//! On-disk resume tokens: one JSON file per task under `resume/{task_id}.resume`.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use serde::{Deserialize, Serialize};

use crate::retry::TransportError;

/// The server-side identity a partial download was validated against.
/// Compared field-by-field the way `safe_resume::validate` does: a `None` on
/// both sides is "no signal, assume unchanged", anything else is a strict
/// equality check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validator {
    /// True if `other` indicates the resource changed since this validator
    /// was captured.
    pub fn changed(&self, other: &Validator) -> bool {
        let etag_changed = match (&self.etag, &other.etag) {
            (None, None) => false,
            (Some(a), Some(b)) => a != b,
            _ => true,
        };
        let last_modified_changed = match (&self.last_modified, &other.last_modified) {
            (None, None) => false,
            (Some(a), Some(b)) => a != b,
            _ => true,
        };
        etag_changed || last_modified_changed
    }
}

/// Everything needed to resume a partial download: the validator captured
/// at the last successful byte and the offset to resume from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub validator: Validator,
    pub next_offset: i64,
}

pub fn path_for(resume_dir: &Path, task_id: Uuid) -> PathBuf {
    resume_dir.join(format!("{task_id}.resume"))
}

pub fn save(resume_dir: &Path, task_id: Uuid, token: &ResumeToken) -> Result<PathBuf, TransportError> {
    std::fs::create_dir_all(resume_dir).map_err(|e| TransportError::DiskIo(e.to_string()))?;
    let path = path_for(resume_dir, task_id);
    let json = serde_json::to_string_pretty(token).map_err(|e| TransportError::DiskIo(e.to_string()))?;
    std::fs::write(&path, json).map_err(|e| TransportError::DiskIo(e.to_string()))?;
    Ok(path)
}

pub fn load(path: &Path) -> Result<ResumeToken, TransportError> {
    let data = std::fs::read_to_string(path).map_err(|e| TransportError::DiskIo(e.to_string()))?;
    serde_json::from_str(&data).map_err(|e| TransportError::InvalidResumeData(e.to_string()))
}

pub fn delete(path: &Path) {
    let _ = std::fs::remove_file(path);
}

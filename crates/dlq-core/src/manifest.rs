//! Immutable input records describing the parts of a dataset to download.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One downloadable part of a multi-part dataset, as supplied externally
/// (e.g. read from a manifest file by the CLI, or handed in by a caller
/// embedding `dlq-core`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub category: String,
    /// 1-indexed position of this part within its category.
    pub part_number: u32,
    pub total_parts: u32,
    pub filename: String,
    pub url: String,
    /// Expected size in bytes; 0 means unknown (discovered from `Content-Length`).
    pub estimated_size: i64,
    pub dataset_name: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum ManifestError {
    #[error("part_number {part_number} out of range for total_parts {total_parts}")]
    PartNumberOutOfRange { part_number: u32, total_parts: u32 },
    #[error("url scheme must be http or https: {0}")]
    UnsupportedScheme(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ManifestEntry {
    /// Validates a manifest entry:
    /// `1 ≤ part_number ≤ total_parts` and an http(s) URL scheme.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.total_parts == 0 || self.part_number < 1 || self.part_number > self.total_parts {
            return Err(ManifestError::PartNumberOutOfRange {
                part_number: self.part_number,
                total_parts: self.total_parts,
            });
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| ManifestError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ManifestError::UnsupportedScheme(other.to_string())),
        }
    }
}

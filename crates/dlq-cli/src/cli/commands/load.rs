//! `dlq load <manifest.json> --dataset <name>`.

use anyhow::{Context, Result};
use dlq_core::{Manager, ManifestEntry};
use serde::Deserialize;
use std::path::Path;

/// Manifest file shape: entries without a dataset name, since one dataset
/// name is supplied once for the whole file on the command line.
#[derive(Debug, Deserialize)]
struct RawEntry {
    category: String,
    part_number: u32,
    total_parts: u32,
    filename: String,
    url: String,
    #[serde(default)]
    estimated_size: i64,
}

pub async fn run_load(manager: &Manager, manifest: &Path, dataset: &str) -> Result<i32> {
    let raw = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;
    let entries: Vec<RawEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing manifest {}", manifest.display()))?;

    let mut loaded = 0usize;
    let mut rejected = 0usize;
    let manifest_entries: Vec<ManifestEntry> = entries
        .into_iter()
        .map(|e| ManifestEntry {
            category: e.category,
            part_number: e.part_number,
            total_parts: e.total_parts,
            filename: e.filename,
            url: e.url,
            estimated_size: e.estimated_size,
            dataset_name: dataset.to_string(),
        })
        .filter(|e| match e.validate() {
            Ok(()) => {
                loaded += 1;
                true
            }
            Err(err) => {
                tracing::warn!("rejecting manifest entry for {}: {}", e.filename, err);
                rejected += 1;
                false
            }
        })
        .collect();

    manager.load_manifest(manifest_entries)?;
    println!("loaded {loaded} entries ({rejected} rejected)");
    if rejected > 0 && loaded == 0 {
        return Ok(2);
    }
    Ok(0)
}

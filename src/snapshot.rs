use crate::types::{Result, Snapshot};
use std::path::Path;
use tracing::info;

/// Read a snapshot artifact from disk.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let content = std::fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&content)?;
    Ok(snapshot)
}

/// Write a snapshot atomically: serialize to a sibling temp file, then
/// rename over the target so readers never observe a partial document.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;

    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;

    info!(
        "Wrote snapshot with {} articles to {}",
        snapshot.count,
        path.display()
    );
    Ok(())
}

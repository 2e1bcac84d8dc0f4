//! Chart descriptor discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DiscoveryError;
use crate::version::CHART_DESCRIPTOR;

/// Recursively lists every file under `root` named exactly `Chart.yaml`.
///
/// Entries are visited in file-name order so results are stable across runs.
/// The first walk error aborts discovery; no partial list is returned.
pub fn discover_charts(root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let _span = tracing::info_span!("discovery.walk").entered();

    let mut charts = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| DiscoveryError {
            path: root.to_path_buf(),
            source: e,
        })?;

        if !entry.file_type().is_dir() && entry.file_name() == CHART_DESCRIPTOR {
            charts.push(entry.into_path());
        }
    }

    log::debug!("Found {} chart descriptors under {}", charts.len(), root.display());
    Ok(charts)
}

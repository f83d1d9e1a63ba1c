use crate::model::{RunState, STATE_SCHEMA_VERSION};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn load_state(path: &Path) -> Result<RunState> {
    if !path.exists() {
        info!(path = %path.display(), "no saved state; every notice counts as new");
        return Ok(RunState::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let state: RunState = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    if state.schema_version > STATE_SCHEMA_VERSION {
        bail!(
            "state file {} has schema version {}, newer than supported {}",
            path.display(),
            state.schema_version,
            STATE_SCHEMA_VERSION
        );
    }

    debug!(
        path = %path.display(),
        localities = state.localities.len(),
        fingerprints = state.localities.values().map(|seen| seen.len()).sum::<usize>(),
        "state loaded"
    );
    Ok(state)
}

/// Writes next to the target and renames over it, so an interrupted run
/// leaves the previous state intact.
pub fn save_state(path: &Path, state: &RunState) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create state directory {}", parent.display()))?;
    }

    let serialized = serde_json::to_string_pretty(state)?;
    let staging = staging_path(path);
    fs::write(&staging, serialized)
        .with_context(|| format!("failed to write state file {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("failed to replace state file {}", path.display()))?;

    debug!(path = %path.display(), localities = state.localities.len(), "state saved");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

//! Model snapshot resolution
//!
//! Each model reference is resolved to its cache directory and one snapshot
//! directory. Results are memoized per cache root and reference so repeated
//! resolution never touches the filesystem again.

use super::cache::model_id_to_cache_name;
use crate::error::{PreflightError, PreflightResult};
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::OnceCell;

/// Resolved on-disk locations of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// `{cache_root}/models--{org}--{name}`
    pub model_dir: PathBuf,
    /// `{model_dir}/snapshots/{revision}`
    pub snapshot_dir: PathBuf,
}

type SnapshotKey = (PathBuf, String);

/// Memoizing resolver from model reference to snapshot directory
#[derive(Default)]
pub struct SnapshotResolver {
    resolved: DashMap<SnapshotKey, Arc<OnceCell<ModelPaths>>>,
}

impl SnapshotResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a model's snapshot directory under `cache_root`
    ///
    /// Concurrent first resolutions of the same model share one probe.
    /// Failures are not memoized.
    pub async fn resolve(&self, cache_root: &Path, model_id: &str) -> PreflightResult<ModelPaths> {
        // Clone the cell out so no map guard is held across the await
        let cell = self
            .resolved
            .entry((cache_root.to_path_buf(), model_id.to_string()))
            .or_default()
            .clone();

        if let Some(paths) = cell.get() {
            tracing::debug!(model_id = %model_id, "Snapshot resolution cache hit");
            return Ok(paths.clone());
        }

        let paths = cell
            .get_or_try_init(|| locate_snapshot(cache_root, model_id))
            .await?;
        Ok(paths.clone())
    }

    /// The memoized paths for a model under `cache_root`, if resolved
    pub fn get(&self, cache_root: &Path, model_id: &str) -> Option<ModelPaths> {
        self.resolved
            .get(&(cache_root.to_path_buf(), model_id.to_string()))
            .and_then(|cell| cell.get().cloned())
    }
}

async fn locate_snapshot(cache_root: &Path, model_id: &str) -> PreflightResult<ModelPaths> {
    let model_dir = cache_root.join(model_id_to_cache_name(model_id));

    if !tokio::fs::metadata(&model_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(PreflightError::ModelNotFound {
            model: model_id.to_string(),
            expected: model_dir,
        });
    }

    let snapshots_dir = model_dir.join("snapshots");
    let snapshot_dir = select_snapshot(&model_dir, &snapshots_dir)
        .await
        .ok_or_else(|| PreflightError::SnapshotNotFound {
            model: model_id.to_string(),
            expected: snapshots_dir.clone(),
        })?;

    tracing::info!(
        model_id = %model_id,
        snapshot = %snapshot_dir.display(),
        "Resolved model snapshot"
    );

    Ok(ModelPaths {
        model_dir,
        snapshot_dir,
    })
}

/// Pick one snapshot directory
///
/// `refs/main` wins when it names an existing snapshot. Otherwise the most
/// recently modified snapshot is used, ties going to the greatest name.
/// The result is always a direct child of `snapshots_dir`.
async fn select_snapshot(model_dir: &Path, snapshots_dir: &Path) -> Option<PathBuf> {
    if let Ok(revision) = tokio::fs::read_to_string(model_dir.join("refs/main")).await {
        let revision = revision.trim();
        if is_revision_name(revision) {
            let candidate = snapshots_dir.join(revision);
            if tokio::fs::metadata(&candidate)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
            tracing::debug!(revision = %revision, "refs/main points at a missing snapshot");
        } else if !revision.is_empty() {
            tracing::warn!(revision = %revision, "Ignoring refs/main that is not a snapshot name");
        }
    }

    let mut entries = tokio::fs::read_dir(snapshots_dir).await.ok()?;
    let mut best: Option<(SystemTime, String, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        if !metadata.is_dir() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let name = entry.file_name().to_string_lossy().into_owned();
        let candidate = (modified, name, entry.path());

        best = match best {
            Some(current) if (&current.0, &current.1) >= (&candidate.0, &candidate.1) => Some(current),
            _ => Some(candidate),
        };
    }

    best.map(|(_, _, path)| path)
}

/// A revision must be a single plain path component
fn is_revision_name(revision: &str) -> bool {
    let mut components = Path::new(revision).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

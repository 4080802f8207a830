//! Tokenizer asset reconciliation
//!
//! Some model snapshots ship without the tokenizer files the serving
//! container needs. The reconciler copies the missing ones from a bundled
//! asset directory. It only ever adds files: an existing destination is
//! never overwritten, truncated or removed.

use crate::error::PreflightError;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A missing asset that could not be copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAsset {
    pub file: String,
    pub reason: String,
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Required files absent from the snapshot, in required order
    pub missing: Vec<String>,
    /// Files copied into the snapshot (or that would be, in test mode)
    pub copied: Vec<String>,
    /// Missing files that were not copied
    pub skipped: Vec<SkippedAsset>,
    pub test_mode: bool,
}

impl ReconciliationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        if self.missing.is_empty() {
            return "all required assets present".to_string();
        }
        let verb = if self.test_mode { "would copy" } else { "copied" };
        format!(
            "{} missing, {} {}, {} skipped",
            self.missing.len(),
            verb,
            self.copied.len(),
            self.skipped.len()
        )
    }
}

/// Copies missing required files from a local asset directory into snapshots
#[derive(Debug, Clone)]
pub struct AssetReconciler {
    asset_dir: PathBuf,
    required: Vec<String>,
    test_mode: bool,
}

impl AssetReconciler {
    pub fn new(asset_dir: impl Into<PathBuf>, required: Vec<String>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            required,
            test_mode: false,
        }
    }

    /// In test mode nothing is written; the report lists what would be copied
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Required files not present in `snapshot_dir`, checked concurrently
    pub async fn missing_files(&self, snapshot_dir: &Path) -> Vec<String> {
        let checks = self.required.iter().map(|file| async move {
            let present = fs::try_exists(snapshot_dir.join(file)).await.unwrap_or(false);
            (!present).then(|| file.clone())
        });

        join_all(checks).await.into_iter().flatten().collect()
    }

    /// Bring `snapshot_dir` up to the required file set
    ///
    /// Per-file problems are recorded in the report and never abort the run.
    pub async fn reconcile(&self, snapshot_dir: &Path) -> ReconciliationReport {
        let missing = self.missing_files(snapshot_dir).await;
        let mut report = ReconciliationReport {
            missing: missing.clone(),
            test_mode: self.test_mode,
            ..Default::default()
        };

        if missing.is_empty() {
            tracing::debug!(snapshot = %snapshot_dir.display(), "All required assets present");
            return report;
        }

        tracing::info!(
            snapshot = %snapshot_dir.display(),
            missing = ?missing,
            "Reconciling missing assets"
        );

        for file in missing {
            let source = self.asset_dir.join(&file);
            if !fs::try_exists(&source).await.unwrap_or(false) {
                tracing::warn!(
                    file = %file,
                    asset_dir = %self.asset_dir.display(),
                    "Asset not bundled, skipping"
                );
                report.skipped.push(SkippedAsset {
                    reason: format!("not present in {}", self.asset_dir.display()),
                    file,
                });
                continue;
            }

            if self.test_mode {
                tracing::info!(file = %file, "Test mode: skipping copy");
                report.copied.push(file);
                continue;
            }

            match copy_new(&source, &snapshot_dir.join(&file)).await {
                Ok(bytes) => {
                    tracing::info!(file = %file, bytes = bytes, "Copied asset");
                    report.copied.push(file);
                }
                Err(e) => {
                    let err = PreflightError::AssetCopy {
                        file: file.clone(),
                        reason: e.to_string(),
                    };
                    tracing::error!(error = %err, "Asset copy failed");
                    report.skipped.push(SkippedAsset {
                        file,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// Copy `source` to `dest`, failing if `dest` already exists
async fn copy_new(source: &Path, dest: &Path) -> std::io::Result<u64> {
    let mut input = fs::File::open(source).await?;
    let mut output = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await?;

    let written = async {
        let bytes = tokio::io::copy(&mut input, &mut output).await?;
        output.flush().await?;
        Ok::<_, std::io::Error>(bytes)
    }
    .await;

    if written.is_err() {
        // Only remove the partial file we created ourselves
        drop(output);
        let _ = fs::remove_file(dest).await;
    }
    written
}

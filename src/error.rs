//! Error types for the verification pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while verifying the host and resolving models
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Required tool not found on PATH: {0}")]
    MissingTool(String),

    #[error("Unsupported GPU compute capability: found {found}, expected major version {expected}")]
    UnsupportedGpu { found: String, expected: u32 },

    #[error("Unsupported CUDA version: found {found}, expected at least {minimum}")]
    UnsupportedCuda { found: String, minimum: u32 },

    #[error("Failed to resolve model cache root: {0}")]
    CacheResolution(String),

    #[error("Model {model} not found in cache (expected {expected:?})")]
    ModelNotFound { model: String, expected: PathBuf },

    #[error("No snapshot found for model {model} (expected a directory under {expected:?})")]
    SnapshotNotFound { model: String, expected: PathBuf },

    #[error("Failed to copy asset {file}: {reason}")]
    AssetCopy { file: String, reason: String },

    #[error("Failed to invoke command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` did not finish within {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Failed to download model {model}: {reason}")]
    Download { model: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PreflightResult<T> = Result<T, PreflightError>;

impl PreflightError {
    /// Copy-paste command that fixes the error, where the fix is mechanical
    pub fn remediation(&self, download_template: &str) -> Option<String> {
        match self {
            Self::ModelNotFound { model, .. } | Self::SnapshotNotFound { model, .. } => {
                Some(download_template.replace("{model}", model))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_for_missing_model() {
        let err = PreflightError::ModelNotFound {
            model: "jinaai/jina-reranker-v3".to_string(),
            expected: PathBuf::from("/cache/models--jinaai--jina-reranker-v3"),
        };
        assert_eq!(
            err.remediation("hf download {model}"),
            Some("hf download jinaai/jina-reranker-v3".to_string())
        );
    }

    #[test]
    fn test_no_remediation_for_cache_error() {
        let err = PreflightError::CacheResolution("boom".to_string());
        assert!(err.remediation("hf download {model}").is_none());
    }

    #[test]
    fn test_snapshot_error_mentions_expected_path() {
        let err = PreflightError::SnapshotNotFound {
            model: "a/b".to_string(),
            expected: PathBuf::from("/cache/models--a--b/snapshots"),
        };
        assert!(err.to_string().contains("models--a--b/snapshots"));
    }
}

//! Model download using hf-hub
//!
//! Used when the pipeline is asked to fetch missing models instead of only
//! printing the download command. Files land in the resolved cache root using
//! the standard HuggingFace cache layout, so snapshot resolution can run again
//! afterwards.

use crate::error::{PreflightError, PreflightResult};
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use std::path::{Path, PathBuf};

/// Files every servable model needs
const ESSENTIAL_FILES: &[&str] = &["config.json"];

/// Weight formats, in order of preference
const WEIGHT_FILES: &[&str] = &[
    "model.safetensors",
    "model.safetensors.index.json",
    "pytorch_model.bin",
];

/// Tokenizer and pooling side files, fetched when the repo has them
const OPTIONAL_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "vocab.json",
    "vocab.txt",
    "merges.txt",
    "modules.json",
    "sentence_bert_config.json",
];

/// Download a model into `cache_dir`
///
/// Returns the snapshot directory the files were written to.
pub async fn download_model_to_cache(model_id: &str, cache_dir: &Path) -> PreflightResult<PathBuf> {
    tracing::info!(model_id = %model_id, cache_dir = %cache_dir.display(), "Starting model download via hf-hub");

    let download_error = |reason: String| PreflightError::Download {
        model: model_id.to_string(),
        reason,
    };

    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .build()
        .map_err(|e| download_error(format!("failed to create HF API client: {}", e)))?;

    let repo = api.model(model_id.to_string());

    let mut config_path: Option<PathBuf> = None;
    for file in ESSENTIAL_FILES {
        tracing::debug!(model_id = %model_id, file = %file, "Downloading file");
        let path = repo
            .get(file)
            .await
            .map_err(|e| download_error(format!("failed to download {}: {}", file, e)))?;
        if *file == "config.json" {
            config_path = Some(path);
        }
    }

    let mut downloaded_weights = false;
    for file in WEIGHT_FILES {
        if repo.get(file).await.is_ok() {
            tracing::debug!(model_id = %model_id, file = %file, "Downloaded weight file");
            downloaded_weights = true;

            if file.ends_with(".index.json") {
                download_sharded_weights(&repo, model_id)
                    .await
                    .map_err(download_error)?;
            }
            break;
        }
    }

    if !downloaded_weights {
        tracing::warn!(model_id = %model_id, "No standard weight files found, model may use custom format");
    }

    for file in OPTIONAL_FILES {
        if repo.get(file).await.is_ok() {
            tracing::debug!(model_id = %model_id, file = %file, "Downloaded optional file");
        }
    }

    config_path
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .ok_or_else(|| download_error("snapshot path not found after download".to_string()))
}

/// Download the shard files referenced by a safetensors index
async fn download_sharded_weights(repo: &ApiRepo, model_id: &str) -> Result<(), String> {
    let index_path = repo
        .get("model.safetensors.index.json")
        .await
        .map_err(|e| format!("failed to get index file: {}", e))?;

    let index_content = tokio::fs::read_to_string(&index_path)
        .await
        .map_err(|e| format!("failed to read index file: {}", e))?;

    let shards = shard_files(&index_content)?;
    tracing::info!(model_id = %model_id, shard_count = shards.len(), "Downloading sharded weights");

    for shard in shards {
        tracing::debug!(model_id = %model_id, shard = %shard, "Downloading shard");
        repo.get(&shard)
            .await
            .map_err(|e| format!("failed to download shard {}: {}", shard, e))?;
    }

    Ok(())
}

/// Unique shard filenames from a safetensors index, sorted
fn shard_files(index_content: &str) -> Result<Vec<String>, String> {
    let index: serde_json::Value = serde_json::from_str(index_content)
        .map_err(|e| format!("failed to parse index file: {}", e))?;

    let mut shards: Vec<String> = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.values()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    shards.sort();
    shards.dedup();
    Ok(shards)
}

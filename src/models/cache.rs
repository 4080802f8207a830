//! HuggingFace cache root resolution
//!
//! The cache root is read from the hub CLI's environment dump rather than
//! guessed from environment variables, so it matches wherever `hf download`
//! actually writes. Cache structure:
//! ```text
//! $HF_HUB_CACHE/
//! ├── models--jinaai--jina-code-embeddings-1.5b/
//! │   ├── snapshots/
//! │   │   └── {revision}/
//! │   │       ├── config.json
//! │   │       ├── model.safetensors
//! │   │       └── tokenizer.json
//! │   └── refs/
//! │       └── main
//! └── models--jinaai--jina-reranker-v3/
//!     └── ...
//! ```

use crate::error::{PreflightError, PreflightResult};
use crate::runner::SharedRunner;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

/// Prefixes accepted in front of a model id
const MODEL_ID_PREFIXES: &[&str] = &["https://huggingface.co/", "huggingface.co/", "hf.co/"];

/// Strip an optional hub prefix, leaving the bare `namespace/name`
///
/// e.g., "hf.co/jinaai/jina-reranker-v3" -> "jinaai/jina-reranker-v3"
pub fn normalize_model_id(model_id: &str) -> &str {
    MODEL_ID_PREFIXES
        .iter()
        .find_map(|prefix| model_id.strip_prefix(prefix))
        .unwrap_or(model_id)
        .trim_matches('/')
}

/// Convert model ID to cache directory name
///
/// HuggingFace uses `models--{org}--{name}` format
/// e.g., "jinaai/jina-reranker-v3" -> "models--jinaai--jina-reranker-v3"
pub fn model_id_to_cache_name(model_id: &str) -> String {
    format!("models--{}", normalize_model_id(model_id).replace('/', "--"))
}

/// Find `key` in line-oriented `KEY: value` output and return the value
///
/// Lines may carry a leading list marker (`- HF_HUB_CACHE: /path`). The value
/// is everything after the first colon, trimmed.
pub fn parse_cache_root(output: &str, key: &str) -> Option<PathBuf> {
    output.lines().find_map(|line| {
        let line = line.trim_start_matches(|c: char| c == '-' || c.is_whitespace());
        let (label, value) = line.split_once(':')?;
        if label.trim() != key {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| PathBuf::from(value))
    })
}

/// Resolves the model cache root once per resolver lifetime
pub struct CacheResolver {
    runner: SharedRunner,
    command: String,
    key: String,
    root: OnceCell<PathBuf>,
}

impl CacheResolver {
    pub fn new(runner: SharedRunner, command: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            runner,
            command: command.into(),
            key: key.into(),
            root: OnceCell::new(),
        }
    }

    /// Create a resolver whose root is already known, skipping the query entirely
    pub fn with_root(runner: SharedRunner, root: PathBuf) -> Self {
        Self {
            runner,
            command: String::new(),
            key: String::new(),
            root: OnceCell::new_with(Some(root)),
        }
    }

    /// Resolve the cache root, querying the host only on the first call
    pub async fn resolve(&self) -> PreflightResult<&Path> {
        let root = self
            .root
            .get_or_try_init(|| self.query())
            .await?;
        Ok(root.as_path())
    }

    /// The memoized root, if it has been resolved
    pub fn get(&self) -> Option<&Path> {
        self.root.get().map(PathBuf::as_path)
    }

    async fn query(&self) -> PreflightResult<PathBuf> {
        tracing::debug!(command = %self.command, key = %self.key, "Querying model cache root");

        let output = self
            .runner
            .run(&self.command)
            .await
            .map_err(|e| PreflightError::CacheResolution(e.to_string()))?;

        if !output.success() {
            return Err(PreflightError::CacheResolution(format!(
                "`{}` exited with {}: {}",
                self.command,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let root = parse_cache_root(&output.stdout, &self.key).ok_or_else(|| {
            PreflightError::CacheResolution(format!(
                "`{}` output has no {} entry",
                self.command, self.key
            ))
        })?;

        tracing::info!(cache_root = %root.display(), "Resolved model cache root");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HF_ENV: &str = "
Copy-and-paste the text below in your GitHub issue.

- huggingface_hub version: 0.36.0
- Platform: Linux-6.8.0-x86_64-with-glibc2.39
- Running in notebook ?: No
- HF_HOME: /home/dev/.cache/huggingface
- HF_HUB_CACHE: /home/dev/.cache/huggingface/hub
- HF_TOKEN_PATH: /home/dev/.cache/huggingface/token
";

    #[test]
    fn test_model_id_to_cache_name() {
        assert_eq!(
            model_id_to_cache_name("jinaai/jina-reranker-v3"),
            "models--jinaai--jina-reranker-v3"
        );
        assert_eq!(
            model_id_to_cache_name("jinaai/jina-code-embeddings-1.5b"),
            "models--jinaai--jina-code-embeddings-1.5b"
        );
    }

    #[test]
    fn test_model_id_prefix_is_stripped() {
        assert_eq!(
            model_id_to_cache_name("hf.co/jinaai/jina-reranker-v3"),
            "models--jinaai--jina-reranker-v3"
        );
        assert_eq!(
            model_id_to_cache_name("https://huggingface.co/BAAI/bge-small-en-v1.5"),
            "models--BAAI--bge-small-en-v1.5"
        );
    }

    #[test]
    fn test_normalize_model_id() {
        assert_eq!(normalize_model_id("hf.co/org/name"), "org/name");
        assert_eq!(normalize_model_id("huggingface.co/org/name/"), "org/name");
        assert_eq!(normalize_model_id("org/name"), "org/name");
    }

    #[test]
    fn test_parse_cache_root() {
        assert_eq!(
            parse_cache_root(HF_ENV, "HF_HUB_CACHE"),
            Some(PathBuf::from("/home/dev/.cache/huggingface/hub"))
        );
        assert_eq!(
            parse_cache_root(HF_ENV, "HF_HOME"),
            Some(PathBuf::from("/home/dev/.cache/huggingface"))
        );
    }

    #[test]
    fn test_parse_cache_root_value_keeps_later_colons() {
        let output = "- HF_HUB_CACHE: C:\\Users\\dev\\hub\n";
        assert_eq!(
            parse_cache_root(output, "HF_HUB_CACHE"),
            Some(PathBuf::from("C:\\Users\\dev\\hub"))
        );
    }

    #[test]
    fn test_parse_cache_root_missing_or_empty() {
        assert_eq!(parse_cache_root(HF_ENV, "HF_XET_CACHE"), None);
        assert_eq!(parse_cache_root("- HF_HUB_CACHE:   \n", "HF_HUB_CACHE"), None);
        assert_eq!(parse_cache_root("", "HF_HUB_CACHE"), None);
    }
}

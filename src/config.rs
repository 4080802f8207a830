//! Configuration structures and loading logic

use crate::error::{PreflightError, PreflightResult};
use crate::models::normalize_model_id;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Binaries that must be on PATH
    pub tools: Vec<String>,
    /// Which of `tools` is the hub CLI
    pub hub_cli: String,
    pub compute_capability_major: u32,
    pub min_cuda_major: u32,
    /// Command whose output names the model cache root
    pub cache_env_command: String,
    pub cache_env_key: String,
    /// Skip the cache query and use this root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Bundled tokenizer assets
    pub asset_dir: PathBuf,
    /// Report asset copies without performing them
    pub test_mode: bool,
    /// Force a runtime: bash, sh, pwsh, cmd or direct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Where to record resolved snapshot directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,
    pub download_missing: bool,
    /// Remediation printed for a missing model; `{model}` is substituted
    pub download_command: String,
    pub models: Vec<ModelConfig>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            tools: default_tools(),
            hub_cli: default_hub_cli(),
            compute_capability_major: crate::gpu::SUPPORTED_COMPUTE_MAJOR,
            min_cuda_major: crate::gpu::MIN_CUDA_MAJOR,
            cache_env_command: default_cache_env_command(),
            cache_env_key: default_cache_env_key(),
            cache_dir: None,
            asset_dir: default_asset_dir(),
            test_mode: false,
            runtime: None,
            command_timeout_secs: None,
            env_file: None,
            download_missing: false,
            download_command: default_download_command(),
            models: default_models(),
        }
    }
}

impl PreflightConfig {
    /// Load configuration with environment variable overrides
    ///
    /// Without an explicit path the per-user config file is used if present.
    pub fn load(path: Option<PathBuf>) -> PreflightResult<Self> {
        let path = path.or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PreflightResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PreflightError::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        toml::from_str(&content).map_err(|e| {
            PreflightError::Config(format!("failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Apply `INDEX_PREFLIGHT_*` overrides using the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> PreflightResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(runtime) = lookup("INDEX_PREFLIGHT_RUNTIME") {
            self.runtime = Some(runtime);
        }
        if let Some(flag) = lookup("INDEX_PREFLIGHT_TEST_MODE") {
            self.test_mode = parse_flag(&flag).ok_or_else(|| {
                PreflightError::Config(format!("invalid INDEX_PREFLIGHT_TEST_MODE value '{}'", flag))
            })?;
        }
        if let Some(dir) = lookup("INDEX_PREFLIGHT_ASSET_DIR") {
            self.asset_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("INDEX_PREFLIGHT_ENV_FILE") {
            self.env_file = Some(PathBuf::from(file));
        }
        if let Some(timeout) = lookup("INDEX_PREFLIGHT_COMMAND_TIMEOUT") {
            self.command_timeout_secs = Some(timeout.parse().map_err(|_| {
                PreflightError::Config(format!(
                    "invalid INDEX_PREFLIGHT_COMMAND_TIMEOUT value '{}'",
                    timeout
                ))
            })?);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> PreflightResult<()> {
        let invalid = |msg: String| Err(PreflightError::Config(msg));

        if self.tools.is_empty() {
            return invalid("at least one required tool must be listed".to_string());
        }
        if self.models.is_empty() {
            return invalid("at least one model must be configured".to_string());
        }
        if self.command_timeout_secs == Some(0) {
            return invalid("command_timeout_secs must be greater than zero".to_string());
        }
        if !self.tools.contains(&self.hub_cli) {
            return invalid(format!(
                "hub_cli '{}' must be one of the required tools",
                self.hub_cli
            ));
        }

        let mut ids = HashSet::new();
        let mut env_keys = HashSet::new();

        for model in &self.models {
            let id = normalize_model_id(&model.id);
            if !is_model_reference(id) {
                return invalid(format!(
                    "model id '{}' must have the form namespace/name",
                    model.id
                ));
            }
            if !ids.insert(id) {
                return invalid(format!("duplicate model id: {}", model.id));
            }
            if let Some(key) = &model.env_key {
                if !is_env_identifier(key) {
                    return invalid(format!("env_key '{}' is not a valid variable name", key));
                }
                if !env_keys.insert(key) {
                    return invalid(format!("duplicate env_key: {}", key));
                }
            }
        }

        Ok(())
    }

    /// Rewrite prefixed model ids (`hf.co/org/name`) to bare `org/name`
    pub fn normalize_model_ids(&mut self) {
        for model in &mut self.models {
            let id = normalize_model_id(&model.id);
            if id != model.id {
                model.id = id.to_string();
            }
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn gpu_requirements(&self) -> crate::gpu::GpuRequirements {
        crate::gpu::GpuRequirements {
            compute_major: self.compute_capability_major,
            min_cuda_major: self.min_cuda_major,
        }
    }
}

/// A model the deployment needs in the local cache
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelConfig {
    /// HuggingFace model ID (e.g., "jinaai/jina-reranker-v3")
    pub id: String,

    /// Env-file key receiving the snapshot directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_key: Option<String>,

    /// Files to reconcile into the snapshot from the asset directory
    #[serde(default)]
    pub assets: Vec<String>,
}

fn is_model_reference(id: &str) -> bool {
    match id.split_once('/') {
        Some((namespace, name)) => {
            !namespace.is_empty() && !name.is_empty() && !name.contains('/')
        }
        None => false,
    }
}

fn is_env_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("index-preflight/config.toml"))
}

// Default functions
fn default_tools() -> Vec<String> {
    vec!["docker".to_string(), "nvidia-smi".to_string(), "hf".to_string()]
}
fn default_hub_cli() -> String {
    "hf".to_string()
}
fn default_cache_env_command() -> String {
    "hf env".to_string()
}
fn default_cache_env_key() -> String {
    "HF_HUB_CACHE".to_string()
}
fn default_asset_dir() -> PathBuf {
    PathBuf::from("assets")
}
fn default_download_command() -> String {
    "hf download {model}".to_string()
}
fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            id: "jinaai/jina-code-embeddings-1.5b".to_string(),
            env_key: Some("EMBEDDING_MODEL_DIR".to_string()),
            assets: vec![
                "tokenizer.json".to_string(),
                "tokenizer_config.json".to_string(),
                "vocab.json".to_string(),
                "merges.txt".to_string(),
                "special_tokens_map.json".to_string(),
            ],
        },
        ModelConfig {
            id: "jinaai/jina-reranker-v3".to_string(),
            env_key: Some("RERANKER_MODEL_DIR".to_string()),
            assets: Vec::new(),
        },
    ]
}

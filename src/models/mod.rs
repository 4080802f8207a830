//! Model cache management
//!
//! Provides functionality for:
//! - Resolving the HuggingFace cache root from `hf env`
//! - Resolving each required model's snapshot directory
//! - Reconciling missing tokenizer assets into a snapshot
//! - Downloading missing models from HuggingFace Hub

pub mod assets;
pub mod cache;
pub mod download;
pub mod snapshot;

pub use assets::{AssetReconciler, ReconciliationReport, SkippedAsset};
pub use cache::{CacheResolver, model_id_to_cache_name, normalize_model_id, parse_cache_root};
pub use download::download_model_to_cache;
pub use snapshot::{ModelPaths, SnapshotResolver};

//! Index Preflight - host verification for a local GPU code-embedding deployment
//!
//! Verifies required tooling and GPU capability, resolves cached model
//! snapshots, reconciles missing tokenizer assets, and provides an interactive
//! vector-search client against the running deployment.

pub mod checks;
pub mod config;
pub mod env_file;
pub mod error;
pub mod gpu;
pub mod models;
pub mod preflight;
pub mod runner;
pub mod search;

pub use checks::CheckResult;
pub use config::{ModelConfig, PreflightConfig};
pub use error::{PreflightError, PreflightResult};
pub use models::{AssetReconciler, CacheResolver, ReconciliationReport, SnapshotResolver};
pub use preflight::{Preflight, PreflightOutcome, PreflightReport, Stage};
pub use runner::{CommandOutput, CommandRunner, SharedRunner, select_runner};
pub use search::{SearchClient, SearchError};

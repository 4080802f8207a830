//! Host verification checks
//!
//! Each check yields a [`CheckResult`]. Independent checks within a stage are
//! run concurrently and folded together with [`CheckResult::aggregate`] so
//! every failure is reported, not just the first.

pub mod tools;

pub use tools::{RequiredTools, check_tool, check_tools, hub_cli_install_suggestion};

use serde::Serialize;

/// Outcome of one verification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub success: bool,
    pub messages: Vec<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            messages: vec![message.into()],
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            messages: vec![message.into()],
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Fold the results of one stage into a single result
    ///
    /// On success all messages are kept. On failure only the messages of
    /// the failing results are kept, in input order.
    pub fn aggregate(name: impl Into<String>, results: Vec<CheckResult>) -> Self {
        let success = results.iter().all(|r| r.success);
        let messages = results
            .into_iter()
            .filter(|r| success || !r.success)
            .flat_map(|r| r.messages)
            .collect();

        Self {
            name: name.into(),
            success,
            messages,
        }
    }
}

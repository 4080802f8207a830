//! Required tool presence checks

use super::CheckResult;
use crate::runner::CommandRunner;
use futures::future::join_all;

/// Package managers able to install the hub CLI, in priority order
const HUB_CLI_INSTALLERS: &[(&str, &str)] = &[
    ("uv", "uv tool install \"huggingface_hub[cli]\""),
    ("pipx", "pipx install \"huggingface_hub[cli]\""),
    ("pip3", "pip3 install --user -U \"huggingface_hub[cli]\""),
    ("pip", "pip install --user -U \"huggingface_hub[cli]\""),
    ("brew", "brew install huggingface-cli"),
];

const HUB_CLI_BOOTSTRAP: &str = "curl -LsSf https://hf.co/cli/install.sh | bash";

/// The binaries the deployment needs on PATH
#[derive(Debug, Clone)]
pub struct RequiredTools {
    pub tools: Vec<String>,
    /// Which of `tools` is the hub CLI (gets install suggestions when missing)
    pub hub_cli: String,
}

/// Probe a single tool with `which`
pub async fn check_tool(runner: &dyn CommandRunner, tool: &str) -> CheckResult {
    let name = format!("tool:{}", tool);
    match runner.run(&format!("which {}", tool)).await {
        Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
            let location = output.stdout.lines().next().unwrap_or_default().trim();
            tracing::debug!(tool = %tool, location = %location, "Found tool");
            CheckResult::pass(name, format!("{} found at {}", tool, location))
        }
        Ok(_) => CheckResult::fail(name, format!("{} not found on PATH", tool)),
        Err(e) => CheckResult::fail(name, format!("{} could not be checked: {}", tool, e)),
    }
}

/// Suggest how to install the hub CLI using the first available package manager
pub async fn hub_cli_install_suggestion(runner: &dyn CommandRunner) -> String {
    for (manager, install) in HUB_CLI_INSTALLERS {
        if let Ok(output) = runner.run(&format!("which {}", manager)).await
            && output.success()
        {
            tracing::debug!(manager = %manager, "Suggesting hub CLI install via package manager");
            return format!("Install it with: {}", install);
        }
    }
    format!("Install it with: {}", HUB_CLI_BOOTSTRAP)
}

/// Check every required tool concurrently
///
/// Any missing tool fails the stage; all failures are reported together.
pub async fn check_tools(runner: &dyn CommandRunner, required: &RequiredTools) -> CheckResult {
    let probes = required.tools.iter().map(|tool| async move {
        let result = check_tool(runner, tool).await;
        if !result.success && *tool == required.hub_cli {
            let suggestion = hub_cli_install_suggestion(runner).await;
            return result.with_message(suggestion);
        }
        result
    });

    let results = join_all(probes).await;
    CheckResult::aggregate("tools", results)
}

//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use index_preflight::{CommandOutput, CommandRunner, PreflightError, PreflightResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const SMI_BANNER_13_1: &str = "\
+-----------------------------------------------------------------------------------------+
| NVIDIA-SMI 580.95.05              Driver Version: 580.95.05      CUDA Version: 13.1     |
+-----------------------------------------+------------------------+----------------------+";

pub const COMPUTE_CAP_QUERY: &str = "nvidia-smi --query-gpu=compute_cap --format=csv,noheader";

enum Scripted {
    Output(CommandOutput),
    SpawnFailure,
}

/// Scripted runner: answers known commands, records every invocation
///
/// Unknown commands behave like a shell that can't find the program
/// (exit 127).
#[derive(Default)]
pub struct FakeRunner {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, command: &str, stdout: &str) -> Self {
        self.script(
            command,
            Scripted::Output(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: 0,
            }),
        )
    }

    pub fn exit_with(self, command: &str, exit_code: i32, stderr: &str) -> Self {
        self.script(
            command,
            Scripted::Output(CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code,
            }),
        )
    }

    pub fn spawn_failure(self, command: &str) -> Self {
        self.script(command, Scripted::SpawnFailure)
    }

    /// Make `which <tool>` succeed
    pub fn with_tool(self, tool: &str) -> Self {
        let command = format!("which {}", tool);
        self.respond(&command, &format!("/usr/bin/{}\n", tool))
    }

    /// A host with every tool, a supported GPU and the given cache root
    pub fn healthy_host(cache_root: &Path) -> Self {
        Self::new()
            .with_tool("docker")
            .with_tool("nvidia-smi")
            .with_tool("hf")
            .respond(COMPUTE_CAP_QUERY, "12.0\n")
            .respond("nvidia-smi", SMI_BANNER_13_1)
            .respond(
                "hf env",
                &format!(
                    "- huggingface_hub version: 0.36.0\n- HF_HUB_CACHE: {}\n",
                    cache_root.display()
                ),
            )
    }

    fn script(self, command: &str, response: Scripted) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    fn answer(&self, command: &str) -> PreflightResult<CommandOutput> {
        self.calls.lock().unwrap().push(command.to_string());
        match self.responses.lock().unwrap().get(command) {
            Some(Scripted::Output(output)) => Ok(output.clone()),
            Some(Scripted::SpawnFailure) => Err(PreflightError::Spawn {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no shell"),
            }),
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("{}: command not found", command),
                exit_code: 127,
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(&self, command: &str) -> PreflightResult<CommandOutput> {
        tokio::task::yield_now().await;
        self.answer(command)
    }

    fn run_blocking(&self, command: &str) -> PreflightResult<CommandOutput> {
        self.answer(command)
    }
}

/// Create `{root}/models--org--name/snapshots/{rev}` holding the given files
pub fn make_snapshot(root: &Path, model_id: &str, revision: &str, files: &[&str]) -> PathBuf {
    let snapshot = root
        .join(index_preflight::models::model_id_to_cache_name(model_id))
        .join("snapshots")
        .join(revision);
    std::fs::create_dir_all(&snapshot).unwrap();
    for file in files {
        std::fs::write(snapshot.join(file), "{}").unwrap();
    }
    snapshot
}

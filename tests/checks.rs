//! Tool and hardware checks against a scripted runner

mod common;

use common::{COMPUTE_CAP_QUERY, FakeRunner, SMI_BANNER_13_1};
use index_preflight::checks::{RequiredTools, check_tools};
use index_preflight::gpu::{GpuRequirements, check_gpu};

fn required() -> RequiredTools {
    RequiredTools {
        tools: vec!["docker".to_string(), "nvidia-smi".to_string(), "hf".to_string()],
        hub_cli: "hf".to_string(),
    }
}

#[tokio::test]
async fn test_all_tools_present() {
    let runner = FakeRunner::new()
        .with_tool("docker")
        .with_tool("nvidia-smi")
        .with_tool("hf");

    let result = check_tools(&runner, &required()).await;

    assert!(result.success);
    assert_eq!(result.messages.len(), 3);
    assert!(result.messages[0].contains("/usr/bin/docker"));
}

#[tokio::test]
async fn test_one_missing_tool_names_only_that_tool() {
    let runner = FakeRunner::new().with_tool("nvidia-smi").with_tool("hf");

    let result = check_tools(&runner, &required()).await;

    assert!(!result.success);
    assert_eq!(result.messages, vec!["docker not found on PATH"]);
}

#[tokio::test]
async fn test_all_missing_tools_reported_together() {
    let runner = FakeRunner::new().with_tool("hf");

    let result = check_tools(&runner, &required()).await;

    assert!(!result.success);
    assert_eq!(
        result.messages,
        vec!["docker not found on PATH", "nvidia-smi not found on PATH"]
    );
}

#[tokio::test]
async fn test_missing_hub_cli_suggests_first_package_manager() {
    let runner = FakeRunner::new()
        .with_tool("docker")
        .with_tool("nvidia-smi")
        .with_tool("pipx")
        .with_tool("brew");

    let result = check_tools(&runner, &required()).await;

    assert!(!result.success);
    assert_eq!(result.messages[0], "hf not found on PATH");
    assert_eq!(
        result.messages[1],
        "Install it with: pipx install \"huggingface_hub[cli]\""
    );
    // uv is probed first but absent; brew is never reached
    assert_eq!(runner.count("which uv"), 1);
    assert_eq!(runner.count("which brew"), 0);
}

#[tokio::test]
async fn test_missing_hub_cli_falls_back_to_bootstrap() {
    let runner = FakeRunner::new().with_tool("docker").with_tool("nvidia-smi");

    let result = check_tools(&runner, &required()).await;

    assert!(!result.success);
    assert!(result.messages[1].contains("https://hf.co/cli/install.sh"));
}

#[tokio::test]
async fn test_spawn_failure_fails_the_tool() {
    let runner = FakeRunner::new()
        .spawn_failure("which docker")
        .with_tool("nvidia-smi")
        .with_tool("hf");

    let result = check_tools(&runner, &required()).await;

    assert!(!result.success);
    assert_eq!(result.messages.len(), 1);
    assert!(result.messages[0].starts_with("docker could not be checked"));
}

#[tokio::test]
async fn test_supported_gpu() {
    let runner = FakeRunner::new()
        .respond(COMPUTE_CAP_QUERY, "12.0\n")
        .respond("nvidia-smi", SMI_BANNER_13_1);

    let result = check_gpu(&runner, GpuRequirements::default()).await;

    assert!(result.success, "{:?}", result.messages);
}

#[tokio::test]
async fn test_gpu_failures_reported_together() {
    let runner = FakeRunner::new()
        .respond(COMPUTE_CAP_QUERY, "8.9\n")
        .respond("nvidia-smi", &SMI_BANNER_13_1.replace("13.1", "12.4"));

    let result = check_gpu(&runner, GpuRequirements::default()).await;

    assert!(!result.success);
    assert_eq!(result.messages.len(), 2);
    assert!(result.messages[0].contains("8.9"));
    assert!(result.messages[1].contains("12.4"));
}

#[tokio::test]
async fn test_gpu_query_failure() {
    let runner = FakeRunner::new()
        .exit_with(COMPUTE_CAP_QUERY, 9, "NVIDIA-SMI has failed")
        .respond("nvidia-smi", SMI_BANNER_13_1);

    let result = check_gpu(&runner, GpuRequirements::default()).await;

    assert!(!result.success);
    assert_eq!(result.messages.len(), 1);
    assert!(result.messages[0].contains("NVIDIA-SMI has failed"));
}

//! GPU and CUDA capability checks
//!
//! Queries nvidia-smi for the compute capability of the first visible GPU and
//! the CUDA version reported by the driver, and enforces the minimums the
//! embedding and reranking containers are built for.

use crate::checks::CheckResult;
use crate::error::PreflightError;
use crate::runner::CommandRunner;
use regex::Regex;
use std::sync::OnceLock;

/// Compute capability major version the container images are built for (Blackwell)
pub const SUPPORTED_COMPUTE_MAJOR: u32 = 12;

/// Minimum CUDA major version reported by the driver
pub const MIN_CUDA_MAJOR: u32 = 13;

const COMPUTE_CAP_QUERY: &str = "nvidia-smi --query-gpu=compute_cap --format=csv,noheader";
const DRIVER_STATUS_QUERY: &str = "nvidia-smi";

fn cuda_version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"CUDA Version:\s*(\d+)(?:\.(\d+))?").expect("static regex is valid")
    })
}

/// Hardware minimums enforced by the hardware stage
#[derive(Debug, Clone, Copy)]
pub struct GpuRequirements {
    pub compute_major: u32,
    pub min_cuda_major: u32,
}

impl Default for GpuRequirements {
    fn default() -> Self {
        Self {
            compute_major: SUPPORTED_COMPUTE_MAJOR,
            min_cuda_major: MIN_CUDA_MAJOR,
        }
    }
}

/// Evaluate raw `compute_cap` query output
///
/// Multi-GPU hosts print one line per device; only the first is considered.
pub fn evaluate_compute_capability(raw: &str, required_major: u32) -> CheckResult {
    let name = "gpu:compute_capability";
    let devices: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let Some(first) = devices.first().copied() else {
        return CheckResult::fail(name, "nvidia-smi reported no GPU compute capability");
    };

    if devices.len() > 1 {
        tracing::debug!(device_count = devices.len(), "Multiple GPUs visible, checking the first");
    }

    let major = first.split('.').next().and_then(|m| m.trim().parse::<u32>().ok());
    match major {
        Some(major) if major == required_major => {
            CheckResult::pass(name, format!("GPU compute capability {} is supported", first))
        }
        _ => CheckResult::fail(
            name,
            PreflightError::UnsupportedGpu {
                found: first.to_string(),
                expected: required_major,
            }
            .to_string(),
        ),
    }
}

/// Extract the CUDA major version from an nvidia-smi status report
pub fn parse_cuda_major(report: &str) -> Option<(u32, String)> {
    let captures = cuda_version_pattern().captures(report)?;
    let major = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let full = match captures.get(2) {
        Some(minor) => format!("{}.{}", major, minor.as_str()),
        None => major.to_string(),
    };
    Some((major, full))
}

/// Evaluate an nvidia-smi status report against the CUDA minimum
pub fn evaluate_cuda_version(report: &str, min_major: u32) -> CheckResult {
    let name = "gpu:cuda_version";
    match parse_cuda_major(report) {
        Some((major, full)) if major >= min_major => {
            CheckResult::pass(name, format!("CUDA {} meets minimum {}", full, min_major))
        }
        Some((_, full)) => CheckResult::fail(
            name,
            PreflightError::UnsupportedCuda {
                found: full,
                minimum: min_major,
            }
            .to_string(),
        ),
        None => CheckResult::fail(
            name,
            PreflightError::UnsupportedCuda {
                found: "unknown (no CUDA version in driver report)".to_string(),
                minimum: min_major,
            }
            .to_string(),
        ),
    }
}

/// Query and check the GPU compute capability
pub async fn check_compute_capability(runner: &dyn CommandRunner, required_major: u32) -> CheckResult {
    match runner.run(COMPUTE_CAP_QUERY).await {
        Ok(output) if output.success() => evaluate_compute_capability(&output.stdout, required_major),
        Ok(output) => CheckResult::fail(
            "gpu:compute_capability",
            format!(
                "GPU compute capability query failed (exit {}): {}",
                output.exit_code,
                output.stderr.trim()
            ),
        ),
        Err(e) => CheckResult::fail("gpu:compute_capability", e.to_string()),
    }
}

/// Query and check the CUDA version reported by the driver
pub async fn check_cuda_version(runner: &dyn CommandRunner, min_major: u32) -> CheckResult {
    match runner.run(DRIVER_STATUS_QUERY).await {
        Ok(output) if output.success() => evaluate_cuda_version(&output.stdout, min_major),
        Ok(output) => CheckResult::fail(
            "gpu:cuda_version",
            format!(
                "Driver status query failed (exit {}): {}",
                output.exit_code,
                output.stderr.trim()
            ),
        ),
        Err(e) => CheckResult::fail("gpu:cuda_version", e.to_string()),
    }
}

/// Run both hardware checks concurrently
pub async fn check_gpu(runner: &dyn CommandRunner, requirements: GpuRequirements) -> CheckResult {
    let (compute, cuda) = futures::join!(
        check_compute_capability(runner, requirements.compute_major),
        check_cuda_version(runner, requirements.min_cuda_major),
    );

    tracing::info!(
        compute_ok = compute.success,
        cuda_ok = cuda.success,
        "Hardware checks finished"
    );

    CheckResult::aggregate("hardware", vec![compute, cuda])
}

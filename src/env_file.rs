//! Persisted `KEY=value` environment file
//!
//! Records resolved snapshot directories so container configuration can
//! mount them. Lines the pipeline doesn't manage are kept as they are.

use crate::error::PreflightResult;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const HEADER_PREFIX: &str = "# Updated by index-preflight";

/// Merge `entries` into existing env-file content
///
/// Managed keys are updated in place, new keys are appended, and the
/// generated header line is refreshed.
pub fn merge_env_content(existing: &str, entries: &[(String, String)], stamp: &str) -> String {
    let mut written = vec![false; entries.len()];
    let mut lines = vec![format!("{} at {}", HEADER_PREFIX, stamp)];

    for line in existing.lines() {
        if line.starts_with(HEADER_PREFIX) {
            continue;
        }

        let key = line
            .split_once('=')
            .map(|(k, _)| k.trim())
            .filter(|k| !k.starts_with('#'));

        match key.and_then(|k| entries.iter().position(|(ek, _)| ek == k)) {
            Some(idx) if !written[idx] => {
                let (k, v) = &entries[idx];
                lines.push(format!("{}={}", k, v));
                written[idx] = true;
            }
            // A repeated managed key is dropped so the file stays unambiguous
            Some(_) => {}
            None => lines.push(line.to_string()),
        }
    }

    for ((key, value), done) in entries.iter().zip(&written) {
        if !done {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

/// Write entries to `path` atomically (temp file, then rename)
pub async fn write_env_file(path: &Path, entries: &[(String, String)]) -> PreflightResult<()> {
    let existing = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let content = merge_env_content(&existing, entries, &stamp);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let temp_file = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_file).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    fs::rename(&temp_file, path).await?;

    tracing::info!(path = %path.display(), keys = entries.len(), "Wrote env file");
    Ok(())
}

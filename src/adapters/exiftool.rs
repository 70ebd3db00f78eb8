//! exiftool subprocess backend for metadata extraction.
//!
//! Each lookup spawns `exiftool` once. Every call is bounded by a timeout;
//! a hung process is killed and the lookup counts as "no data".

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::library::metadata::FieldExtractor;

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// exiftool adapter using subprocess mode
#[derive(Debug, Clone)]
pub struct ExifTool {
    /// Path to the exiftool binary (default: "exiftool")
    binary_path: String,

    /// Upper bound for a single invocation
    call_timeout: Duration,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExifTool {
    /// Create an adapter with the default binary and timeout
    pub fn new() -> Self {
        Self::with_binary_path("exiftool")
    }

    /// Create an adapter with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            call_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Run exiftool and return trimmed stdout, or `None` on any failure
    async fn run(&self, args: &[&str], path: &Path) -> Option<String> {
        let child = Command::new(&self.binary_path)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to spawn {} on {}: {}", self.binary_path, path.display(), e);
                return None;
            }
        };

        let output = match timeout(self.call_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for {} on {}: {}", self.binary_path, path.display(), e);
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    "{} timed out after {:?} on {}",
                    self.binary_path,
                    self.call_timeout,
                    path.display()
                );
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                "{} failed on {} with exit code {}: {}",
                self.binary_path,
                path.display(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl FieldExtractor for ExifTool {
    fn name(&self) -> &str {
        "exiftool"
    }

    async fn extract_field(&self, path: &Path, field: &str) -> String {
        // -s -s -s prints the bare value without the tag name
        let tag = format!("-{}", field);
        self.run(&["-s", "-s", "-s", &tag], path)
            .await
            .unwrap_or_default()
    }

    async fn dump_fields(&self, path: &Path) -> String {
        self.run(&[], path).await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_binary_path() {
        let tool = ExifTool::with_binary_path("/opt/bin/exiftool");
        assert_eq!(tool.binary_path(), "/opt/bin/exiftool");
        assert_eq!(tool.name(), "exiftool");
    }

    #[tokio::test]
    async fn test_missing_binary_is_no_data() {
        let tool = ExifTool::with_binary_path("/nonexistent/booklib-exiftool")
            .with_timeout(Duration::from_secs(1));
        let path = Path::new("/tmp/whatever.pdf");

        assert_eq!(tool.extract_field(path, "Title").await, "");
        assert_eq!(tool.dump_fields(path).await, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_process_times_out() {
        // `sleep 5` stands in for a hung exiftool
        let tool = ExifTool::with_binary_path("sleep").with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();

        assert_eq!(tool.dump_fields(Path::new("5")).await, "");
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}

//! Hand-presence oracle.
//!
//! The detector itself is an external collaborator: the production
//! implementation shells out to a configured command that receives a frame
//! file path and prints a boolean verdict on stdout. Sessions only ever see
//! the boolean.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::Settings;

/// Errors from presence detection.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detector command not found: {0}")]
    ToolNotFound(String),

    #[error("detection failed: {0}")]
    DetectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classifies a video frame as containing a tracked hand or not.
#[async_trait]
pub trait PresenceOracle: Send + Sync {
    async fn detect(&self, frame: &[u8]) -> Result<bool, DetectError>;
}

/// Oracle backed by an external detector command.
///
/// The frame is written to a temp file and the command is invoked with the
/// path as its final argument; stdout of `true`/`1` means a hand is
/// visible.
pub struct CommandDetector {
    command: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let command = parts.next().unwrap_or_default();
        Self {
            command,
            args: parts.collect(),
        }
    }

    async fn run(&self, frame_path: &Path) -> Result<bool, DetectError> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(frame_path)
            .output()
            .await;

        match output {
            Ok(output) => {
                if output.status.success() {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let verdict = stdout.trim().to_ascii_lowercase();
                    Ok(verdict == "true" || verdict == "1")
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(DetectError::DetectionFailed(stderr.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DetectError::ToolNotFound(self.command.clone()))
            }
            Err(e) => Err(DetectError::Io(e)),
        }
    }
}

#[async_trait]
impl PresenceOracle for CommandDetector {
    async fn detect(&self, frame: &[u8]) -> Result<bool, DetectError> {
        let file = tempfile::NamedTempFile::new()?;
        tokio::fs::write(file.path(), frame).await?;
        self.run(file.path()).await
    }
}

/// Oracle used when no detector command is configured: reports every frame
/// as hand-absent, so sessions stay connected but never capture.
pub struct NullDetector;

#[async_trait]
impl PresenceOracle for NullDetector {
    async fn detect(&self, _frame: &[u8]) -> Result<bool, DetectError> {
        Ok(false)
    }
}

/// Build the oracle configured in settings.
pub fn from_settings(settings: &Settings) -> Arc<dyn PresenceOracle> {
    match settings.detector_command.as_deref() {
        Some(cmd) if !cmd.trim().is_empty() => Arc::new(CommandDetector::new(cmd)),
        _ => {
            tracing::warn!("no detector command configured; monitoring sessions will not capture");
            Arc::new(NullDetector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_detector_true_verdict() {
        // `echo true` ignores the frame path argument and always affirms
        let detector = CommandDetector::new("echo true");
        assert!(detector.detect(b"frame").await.unwrap());
    }

    #[tokio::test]
    async fn test_command_detector_false_verdict() {
        let detector = CommandDetector::new("echo false");
        assert!(!detector.detect(b"frame").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_command_reported() {
        let detector = CommandDetector::new("definitely-not-a-real-binary");
        assert!(matches!(
            detector.detect(b"frame").await,
            Err(DetectError::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_null_detector_never_sees_hands() {
        assert!(!NullDetector.detect(b"frame").await.unwrap());
    }
}

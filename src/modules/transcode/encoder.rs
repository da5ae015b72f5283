use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::ladder::Rung;
use super::manifest::{RUNG_MANIFEST, SEGMENT_PATTERN};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Produces one rung artifact (rung manifest plus segments) inside `rung_dir`.
#[async_trait]
pub trait RungEncoder: Send + Sync {
    async fn encode(&self, input: &Path, rung: &Rung, rung_dir: &Path) -> Result<(), EncodeError>;
}

/// HLS encoder backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    preset: String,
    /// Keyframe interval in frames; identical across rungs so segment cuts line up
    gop_size: u32,
    segment_seconds: u32,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            preset: "veryfast".to_string(),
            gop_size: 48,
            segment_seconds: 10,
        }
    }

    pub fn args(&self, input: &Path, rung: &Rung, rung_dir: &Path) -> Vec<String> {
        let segment_path = rung_dir.join(SEGMENT_PATTERN);
        let manifest_path = rung_dir.join(RUNG_MANIFEST);

        vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-preset".into(),
            self.preset.clone(),
            "-g".into(),
            self.gop_size.to_string(),
            "-sc_threshold".into(),
            "0".into(),
            "-s".into(),
            rung.resolution(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            self.segment_seconds.to_string(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            segment_path.to_string_lossy().into_owned(),
            manifest_path.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl RungEncoder for FfmpegEncoder {
    async fn encode(&self, input: &Path, rung: &Rung, rung_dir: &Path) -> Result<(), EncodeError> {
        let args = self.args(input, rung, rung_dir);
        debug!(rung = %rung.name, "Executing {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EncodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Failed {
                status: output.status.to_string(),
                stderr: tail(&stderr, 20),
            });
        }

        Ok(())
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

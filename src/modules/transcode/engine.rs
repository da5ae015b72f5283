use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{Instrument, error, info, info_span};

use super::encoder::{EncodeError, RungEncoder};
use super::ladder::ResolutionLadder;
use super::manifest::{self, MASTER_MANIFEST, RUNG_MANIFEST};

/// The only container the engine accepts.
pub const SUPPORTED_EXTENSION: &str = "mp4";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("input video not found at {0}")]
    InputNotFound(PathBuf),

    #[error("input must be an .mp4 file, found '{0}'")]
    UnsupportedContainer(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("{} of {total} rung encodes failed: {}", .failures.len(), describe(.failures))]
    RungsFailed {
        total: usize,
        failures: Vec<RungFailure>,
    },

    #[error("rung '{0}' finished without writing its manifest")]
    MissingRungManifest(String),
}

#[derive(Debug)]
pub struct RungFailure {
    pub rung: String,
    pub error: EncodeError,
}

fn describe(failures: &[RungFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.rung, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_error(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> TranscodeError {
    let context = context.into();
    move |source| TranscodeError::Io { context, source }
}

/// Rejects anything but `.mp4` (any case), judged by the file name alone.
pub fn check_container(path: &Path) -> Result<(), TranscodeError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension != SUPPORTED_EXTENSION {
        return Err(TranscodeError::UnsupportedContainer(format!(".{}", extension)));
    }
    Ok(())
}

/// Multi-rung HLS conversion of one local file.
pub struct TranscodeEngine<E> {
    ladder: ResolutionLadder,
    encoder: E,
}

impl<E: RungEncoder> TranscodeEngine<E> {
    pub fn new(ladder: ResolutionLadder, encoder: E) -> Self {
        Self { ladder, encoder }
    }

    pub fn ladder(&self) -> &ResolutionLadder {
        &self.ladder
    }

    /// Encodes every rung concurrently into `output_dir/<rung>/` and then
    /// writes `output_dir/master.m3u8`. The master manifest is written only
    /// when every rung succeeded, so its presence marks usable output.
    pub async fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, TranscodeError> {
        let exists = fs::try_exists(input)
            .await
            .map_err(io_error(format!("Failed to inspect {}", input.display())))?;
        if !exists {
            return Err(TranscodeError::InputNotFound(input.to_path_buf()));
        }

        check_container(input)?;

        fs::create_dir_all(output_dir)
            .await
            .map_err(io_error(format!("Failed to create {}", output_dir.display())))?;

        // A master left by an earlier run must not outlive a failed one.
        let master_path = output_dir.join(MASTER_MANIFEST);
        match fs::remove_file(&master_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("Failed to remove stale master manifest")(e)),
        }

        for rung in self.ladder.rungs() {
            let rung_dir = output_dir.join(&rung.name);
            fs::create_dir_all(&rung_dir)
                .await
                .map_err(io_error(format!("Failed to create {}", rung_dir.display())))?;
        }

        info!(
            input = %input.display(),
            rungs = self.ladder.len(),
            "🎥 Starting HLS conversion"
        );

        let jobs = self.ladder.rungs().iter().map(|rung| {
            let rung_dir = output_dir.join(&rung.name);
            async move {
                let result = self.encoder.encode(input, rung, &rung_dir).await;
                match &result {
                    Ok(()) => info!("✅ HLS created for {}", rung.name),
                    Err(e) => error!("❌ Error with {}: {}", rung.name, e),
                }
                (rung.name.clone(), result)
            }
            .instrument(info_span!("rung", rung = %rung.name))
        });

        let failures: Vec<RungFailure> = join_all(jobs)
            .await
            .into_iter()
            .filter_map(|(rung, result)| result.err().map(|error| RungFailure { rung, error }))
            .collect();

        if !failures.is_empty() {
            return Err(TranscodeError::RungsFailed {
                total: self.ladder.len(),
                failures,
            });
        }

        for rung in self.ladder.rungs() {
            let rung_manifest = output_dir.join(&rung.name).join(RUNG_MANIFEST);
            let present = fs::try_exists(&rung_manifest)
                .await
                .map_err(io_error(format!("Failed to inspect {}", rung_manifest.display())))?;
            if !present {
                return Err(TranscodeError::MissingRungManifest(rung.name.clone()));
            }
        }

        let staging = output_dir.join(format!(".{}.tmp", MASTER_MANIFEST));
        fs::write(&staging, manifest::render_master(&self.ladder))
            .await
            .map_err(io_error("Failed to write master manifest"))?;
        fs::rename(&staging, &master_path)
            .await
            .map_err(io_error("Failed to move master manifest into place"))?;

        info!("🎉 {} created at {}", MASTER_MANIFEST, master_path.display());
        Ok(master_path)
    }
}

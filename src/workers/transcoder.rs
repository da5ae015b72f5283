use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};

use crate::modules::job::{
    Buckets, JobStatus, LocalWorkspace, StatusSink, StatusUpdate, TranscodeJob,
};
use crate::modules::storage::{ObjectStorage, StorageError, object_key};
use crate::modules::transcode::manifest::MASTER_MANIFEST;
use crate::modules::transcode::{RungEncoder, TranscodeEngine, TranscodeError, check_container};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("transient key '{0}' does not name a file")]
    InvalidKey(String),

    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[source] StorageError),

    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("promotion failed: {0}")]
    Promote(#[source] StorageError),

    #[error("output promoted but source was not deleted: {0}")]
    DeleteSource(#[source] StorageError),
}

impl JobError {
    /// The full output is already in durable storage.
    pub fn output_promoted(&self) -> bool {
        matches!(self, JobError::DeleteSource(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub master_key: String,
    pub uploaded_files: usize,
}

/// Runs one job's strictly ordered fetch → convert → push → delete sequence.
pub struct JobRunner<S, E, R> {
    storage: S,
    engine: TranscodeEngine<E>,
    status: R,
    buckets: Buckets,
    workspace_root: PathBuf,
}

impl<S, E, R> JobRunner<S, E, R>
where
    S: ObjectStorage,
    E: RungEncoder,
    R: StatusSink,
{
    pub fn new(
        storage: S,
        engine: TranscodeEngine<E>,
        status: R,
        buckets: Buckets,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            storage,
            engine,
            status,
            buckets,
            workspace_root,
        }
    }

    /// Status is written exactly at start, on promotion and on failure.
    pub async fn run(&self, job: &TranscodeJob) -> Result<JobReport, JobError> {
        let span = info_span!("job", key = %job.transient_key, output = %job.output_prefix);

        async {
            self.report(job, JobStatus::Processing, false, None).await;

            match self.execute(job).await {
                Ok(report) => {
                    info!(files = report.uploaded_files, "🎉 Job completed: {}", report.master_key);
                    self.report(job, JobStatus::Completed, true, None).await;
                    Ok(report)
                }
                Err(e) => {
                    error!("❌ Job failed: {}", e);
                    self.report(job, JobStatus::Failed, e.output_promoted(), Some(e.to_string()))
                        .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &TranscodeJob) -> Result<JobReport, JobError> {
        // no point downloading what the engine will refuse
        check_container(Path::new(&job.transient_key))?;

        let workspace = LocalWorkspace::create(&self.workspace_root).map_err(JobError::Workspace)?;
        let input_path = workspace
            .input_path_for(&job.transient_key)
            .ok_or_else(|| JobError::InvalidKey(job.transient_key.clone()))?;

        self.storage
            .fetch(&self.buckets.transient, &job.transient_key, &input_path)
            .await
            .map_err(JobError::Fetch)?;

        self.engine.convert(&input_path, workspace.output_dir()).await?;

        let summary = self
            .storage
            .push_tree(workspace.output_dir(), &self.buckets.durable, &job.output_prefix)
            .await
            .map_err(JobError::Promote)?;

        // Only reached once every output file is in durable storage.
        self.storage
            .delete(&self.buckets.transient, &job.transient_key)
            .await
            .map_err(JobError::DeleteSource)?;

        Ok(JobReport {
            master_key: object_key(&job.output_prefix, MASTER_MANIFEST),
            uploaded_files: summary.file_count(),
        })
    }

    /// `promoted` attaches the durable prefix to the record.
    async fn report(&self, job: &TranscodeJob, status: JobStatus, promoted: bool, detail: Option<String>) {
        let update = StatusUpdate {
            transient_key: job.transient_key.clone(),
            status,
            output_prefix: promoted.then(|| job.output_prefix.clone()),
            detail,
        };

        if let Err(e) = self.status.record(&update).await {
            warn!(status = status.as_str(), "Failed to record job status: {}", e);
        }
    }
}

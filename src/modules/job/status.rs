use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::infrastructure::db::pool::DbPool;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status update failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Points in a job's life the worker reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub transient_key: String,
    pub status: JobStatus,
    /// Durable prefix, set once the output is promoted
    pub output_prefix: Option<String>,
    pub detail: Option<String>,
}

/// Durable record of job outcomes, owned outside the pipeline.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn record(&self, update: &StatusUpdate) -> Result<(), StatusError>;
}

#[async_trait]
impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    async fn record(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        (**self).record(update).await
    }
}

#[async_trait]
impl<T: StatusSink + ?Sized> StatusSink for std::sync::Arc<T> {
    async fn record(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        (**self).record(update).await
    }
}

/// Writes status onto the `videos` row whose `temporary_s3_key` matches.
pub struct PgStatusSink {
    db: DbPool,
}

impl PgStatusSink {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StatusSink for PgStatusSink {
    async fn record(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        let result = sqlx::query(
            "UPDATE videos SET status = $1, \
             permanent_s3_key = COALESCE($2, permanent_s3_key), \
             updated_at = NOW() \
             WHERE temporary_s3_key = $3",
        )
        .bind(update.status.as_str())
        .bind(update.output_prefix.as_deref())
        .bind(&update.transient_key)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            info!(key = %update.transient_key, "No video record to update");
        }
        Ok(())
    }
}

/// Used when no database is configured.
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn record(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        info!(
            key = %update.transient_key,
            status = update.status.as_str(),
            output = update.output_prefix.as_deref().unwrap_or(""),
            detail = update.detail.as_deref().unwrap_or(""),
            "📝 Job status"
        );
        Ok(())
    }
}

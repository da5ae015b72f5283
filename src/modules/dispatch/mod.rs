use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::common::retry::{RetryPolicy, Retryable, with_retry};

pub const ENV_VIDEO_KEY: &str = "TEMP_VIDEO_KEY";
pub const ENV_OUTPUT_PATH: &str = "S3_OUTPUT_PATH";
pub const ENV_REGION: &str = "AWS_REGION";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid dispatch request: {0}")]
    InvalidRequest(&'static str),

    #[error("launcher rejected the task: {0}")]
    Rejected(String),

    #[error("launcher unreachable: {0}")]
    Unavailable(String),
}

impl Retryable for DispatchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, DispatchError::InvalidRequest(_))
    }
}

/// Fixed network/isolation parameters every launched worker receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Subnets (or equivalent) the worker may be placed in
    pub network_targets: Vec<String>,
    /// Security groups (or equivalent) the worker runs under
    pub isolation_group: Vec<String>,
    pub region: String,
    /// Passed to every worker unchanged (bucket names)
    pub shared_environment: Vec<(String, String)>,
}

/// Opaque identifier of a scheduled worker. Scheduling is all it confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle(pub String);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub network_targets: Vec<String>,
    pub isolation_group: Vec<String>,
    pub environment: Vec<(String, String)>,
}

/// Schedules one isolated worker.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<TaskHandle, DispatchError>;
}

#[async_trait]
impl<T: TaskLauncher + ?Sized> TaskLauncher for Box<T> {
    async fn launch(&self, request: LaunchRequest) -> Result<TaskHandle, DispatchError> {
        (**self).launch(request).await
    }
}

#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, transient_key: &str, output_prefix: &str) -> Result<TaskHandle, DispatchError>;
}

pub struct TaskDispatcher<L> {
    launcher: L,
    config: LaunchConfig,
}

impl<L: TaskLauncher> TaskDispatcher<L> {
    pub fn new(launcher: L, config: LaunchConfig) -> Self {
        Self { launcher, config }
    }

    pub fn request_for(&self, transient_key: &str, output_prefix: &str) -> LaunchRequest {
        LaunchRequest {
            network_targets: self.config.network_targets.clone(),
            isolation_group: self.config.isolation_group.clone(),
            environment: [
                (ENV_VIDEO_KEY.to_string(), transient_key.to_string()),
                (ENV_OUTPUT_PATH.to_string(), output_prefix.to_string()),
                (ENV_REGION.to_string(), self.config.region.clone()),
            ]
            .into_iter()
            .chain(self.config.shared_environment.iter().cloned())
            .collect(),
        }
    }
}

#[async_trait]
impl<L: TaskLauncher> Dispatch for TaskDispatcher<L> {
    async fn dispatch(&self, transient_key: &str, output_prefix: &str) -> Result<TaskHandle, DispatchError> {
        if transient_key.trim().is_empty() {
            return Err(DispatchError::InvalidRequest("transient key is empty"));
        }
        if output_prefix.trim().is_empty() {
            return Err(DispatchError::InvalidRequest("output prefix is empty"));
        }

        let handle = self
            .launcher
            .launch(self.request_for(transient_key, output_prefix))
            .await?;

        info!(key = transient_key, task = %handle, "🚀 Worker scheduled");
        Ok(handle)
    }
}

pub struct RetryingDispatcher<D> {
    inner: D,
    policy: RetryPolicy,
}

impl<D> RetryingDispatcher<D> {
    pub fn new(inner: D, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<D: Dispatch> Dispatch for RetryingDispatcher<D> {
    async fn dispatch(&self, transient_key: &str, output_prefix: &str) -> Result<TaskHandle, DispatchError> {
        with_retry(&self.policy, "dispatch", || {
            self.inner.dispatch(transient_key, output_prefix)
        })
        .await
    }
}

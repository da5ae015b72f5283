use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKey {
    AmqpUrl,
    QueueName,
    DeadLetterExchange,
    TransientBucket,
    DurableBucket,
    Region,
    AccessKey,
    SecretKey,
    S3Endpoint,
    WorkerLauncher,
    EcsCluster,
    EcsTaskDefinition,
    EcsContainerName,
    EcsSubnets,
    EcsSecurityGroups,
    WorkerBinary,
    OutputPrefixRoot,
    PollWaitSecs,
    PollIntervalMs,
    RetryMaxAttempts,
    RetryInitialBackoffMs,
    TempVideoKey,
    OutputPath,
    DatabaseUrl,
    WorkspaceDir,
    FfmpegPath,
    ResolutionLadder,
    UploadConcurrency,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::QueueName => "QUEUE_NAME",
            EnvKey::DeadLetterExchange => "QUEUE_DEAD_LETTER_EXCHANGE",
            EnvKey::TransientBucket => "TRANSIENT_BUCKET",
            EnvKey::DurableBucket => "DURABLE_BUCKET",
            EnvKey::Region => "AWS_REGION",
            EnvKey::AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::WorkerLauncher => "WORKER_LAUNCHER",
            EnvKey::EcsCluster => "ECS_CLUSTER",
            EnvKey::EcsTaskDefinition => "ECS_TASK_DEFINITION",
            EnvKey::EcsContainerName => "ECS_CONTAINER_NAME",
            EnvKey::EcsSubnets => "ECS_SUBNETS",
            EnvKey::EcsSecurityGroups => "ECS_SECURITY_GROUPS",
            EnvKey::WorkerBinary => "WORKER_BINARY",
            EnvKey::OutputPrefixRoot => "OUTPUT_PREFIX_ROOT",
            EnvKey::PollWaitSecs => "POLL_WAIT_SECS",
            EnvKey::PollIntervalMs => "POLL_INTERVAL_MS",
            EnvKey::RetryMaxAttempts => "RETRY_MAX_ATTEMPTS",
            EnvKey::RetryInitialBackoffMs => "RETRY_INITIAL_BACKOFF_MS",
            EnvKey::TempVideoKey => "TEMP_VIDEO_KEY",
            EnvKey::OutputPath => "S3_OUTPUT_PATH",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::WorkspaceDir => "WORKSPACE_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::ResolutionLadder => "RESOLUTION_LADDER",
            EnvKey::UploadConcurrency => "UPLOAD_CONCURRENCY",
        }
    }
}

/// Source of configuration values. The process environment in production, a map in tests.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl EnvSource for std::collections::HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Empty values count as absent.
pub fn get(source: &impl EnvSource, key: EnvKey) -> Result<String, ConfigError> {
    get_opt(source, key).ok_or(ConfigError::Missing(key.as_str()))
}

pub fn get_opt(source: &impl EnvSource, key: EnvKey) -> Option<String> {
    source
        .var(key.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_or(source: &impl EnvSource, key: EnvKey, default: &str) -> String {
    get_opt(source, key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<T>(source: &impl EnvSource, key: EnvKey, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_opt(source, key) {
        Some(val) => val.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.as_str(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Comma-separated list, blanks dropped.
pub fn get_list(source: &impl EnvSource, key: EnvKey) -> Result<Vec<String>, ConfigError> {
    let items: Vec<String> = get(source, key)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if items.is_empty() {
        return Err(ConfigError::Missing(key.as_str()));
    }
    Ok(items)
}

use std::path::PathBuf;
use std::time::Duration;

use crate::common::retry::RetryPolicy;
use crate::config::env::{self, ConfigError, EnvKey, EnvSource};
use crate::modules::dispatch::LaunchConfig;
use crate::modules::transcode::ladder::ResolutionLadder;

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Set for MinIO-style deployments; path-style addressing is used when present.
    pub endpoint: Option<String>,
}

impl StorageConfig {
    pub fn from_source(source: &impl EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            region: env::get(source, EnvKey::Region)?,
            access_key: env::get(source, EnvKey::AccessKey)?,
            secret_key: env::get(source, EnvKey::SecretKey)?,
            endpoint: env::get_opt(source, EnvKey::S3Endpoint),
        })
    }
}

#[derive(Clone, Debug)]
pub struct EcsConfig {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub enum LauncherConfig {
    Ecs(EcsConfig),
    Process { binary: String },
}

#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub amqp_url: String,
    pub queue_name: String,
    /// Exchange the queue dead-letters rejected notifications to
    pub dead_letter_exchange: Option<String>,
    pub transient_bucket: String,
    pub durable_bucket: String,
    pub launch: LaunchConfig,
    pub launcher: LauncherConfig,
    pub output_prefix_root: String,
    pub poll_wait: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl IntakeConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(&env::ProcessEnv)
    }

    pub fn from_source(source: &impl EnvSource) -> Result<Self, ConfigError> {
        let region = env::get(source, EnvKey::Region)?;
        let transient_bucket = env::get(source, EnvKey::TransientBucket)?;
        let durable_bucket = env::get(source, EnvKey::DurableBucket)?;
        let shared_environment = vec![
            (EnvKey::TransientBucket.as_str().to_string(), transient_bucket.clone()),
            (EnvKey::DurableBucket.as_str().to_string(), durable_bucket.clone()),
        ];

        let (launch, launcher) = match env::get_or(source, EnvKey::WorkerLauncher, "ecs").as_str() {
            "ecs" => {
                let launch = LaunchConfig {
                    network_targets: env::get_list(source, EnvKey::EcsSubnets)?,
                    isolation_group: env::get_list(source, EnvKey::EcsSecurityGroups)?,
                    region,
                    shared_environment,
                };
                let ecs = EcsConfig {
                    cluster: env::get(source, EnvKey::EcsCluster)?,
                    task_definition: env::get(source, EnvKey::EcsTaskDefinition)?,
                    container_name: env::get_or(source, EnvKey::EcsContainerName, "videoTranscoder"),
                    access_key: env::get(source, EnvKey::AccessKey)?,
                    secret_key: env::get(source, EnvKey::SecretKey)?,
                };
                (launch, LauncherConfig::Ecs(ecs))
            }
            "process" => {
                let launch = LaunchConfig {
                    network_targets: Vec::new(),
                    isolation_group: Vec::new(),
                    region,
                    shared_environment,
                };
                let binary = env::get_or(source, EnvKey::WorkerBinary, "transcode-worker");
                (launch, LauncherConfig::Process { binary })
            }
            other => {
                return Err(ConfigError::Invalid {
                    key: EnvKey::WorkerLauncher.as_str(),
                    reason: format!("unknown launcher '{}', expected 'ecs' or 'process'", other),
                });
            }
        };

        Ok(Self {
            amqp_url: env::get(source, EnvKey::AmqpUrl)?,
            queue_name: env::get(source, EnvKey::QueueName)?,
            dead_letter_exchange: env::get_opt(source, EnvKey::DeadLetterExchange),
            transient_bucket,
            durable_bucket,
            launch,
            launcher,
            output_prefix_root: env::get_or(source, EnvKey::OutputPrefixRoot, "hls"),
            poll_wait: Duration::from_secs(env::get_parsed(source, EnvKey::PollWaitSecs, 10)?),
            poll_interval: Duration::from_millis(env::get_parsed(source, EnvKey::PollIntervalMs, 2000)?),
            retry: retry_policy(source)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub job_key: String,
    pub output_prefix: String,
    pub transient_bucket: String,
    pub durable_bucket: String,
    pub storage: StorageConfig,
    pub database_url: Option<String>,
    pub workspace_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ladder: ResolutionLadder,
    pub upload_concurrency: usize,
    pub retry: RetryPolicy,
}

impl WorkerConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(&env::ProcessEnv)
    }

    pub fn from_source(source: &impl EnvSource) -> Result<Self, ConfigError> {
        let ladder = match env::get_opt(source, EnvKey::ResolutionLadder) {
            Some(json) => ResolutionLadder::from_json(&json).map_err(|e| ConfigError::Invalid {
                key: EnvKey::ResolutionLadder.as_str(),
                reason: e.to_string(),
            })?,
            None => ResolutionLadder::default(),
        };

        let upload_concurrency = env::get_parsed(source, EnvKey::UploadConcurrency, 4usize)?;
        if upload_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: EnvKey::UploadConcurrency.as_str(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            job_key: env::get(source, EnvKey::TempVideoKey)?,
            output_prefix: env::get(source, EnvKey::OutputPath)?,
            transient_bucket: env::get(source, EnvKey::TransientBucket)?,
            durable_bucket: env::get(source, EnvKey::DurableBucket)?,
            storage: StorageConfig::from_source(source)?,
            database_url: env::get_opt(source, EnvKey::DatabaseUrl),
            workspace_dir: env::get_opt(source, EnvKey::WorkspaceDir)
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            ffmpeg_path: env::get_or(source, EnvKey::FfmpegPath, "ffmpeg"),
            ladder,
            upload_concurrency,
            retry: retry_policy(source)?,
        })
    }
}

fn retry_policy(source: &impl EnvSource) -> Result<RetryPolicy, ConfigError> {
    let defaults = RetryPolicy::default();
    Ok(RetryPolicy {
        max_attempts: env::get_parsed(source, EnvKey::RetryMaxAttempts, defaults.max_attempts)?,
        initial_backoff: Duration::from_millis(env::get_parsed(
            source,
            EnvKey::RetryInitialBackoffMs,
            defaults.initial_backoff.as_millis() as u64,
        )?),
        ..defaults
    })
}

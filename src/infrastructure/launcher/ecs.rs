use async_trait::async_trait;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, TaskOverride,
};
use tracing::{info, warn};

use crate::config::settings::EcsConfig;
use crate::modules::dispatch::{DispatchError, LaunchRequest, TaskHandle, TaskLauncher};

/// Launches workers as Fargate tasks.
pub struct EcsLauncher {
    client: Client,
    cluster: String,
    task_definition: String,
    container_name: String,
}

impl EcsLauncher {
    pub fn new(config: &EcsConfig, region: &str) -> Self {
        let credentials = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .build();

        info!(cluster = %config.cluster, "✅ ECS launcher ready");

        Self {
            client: Client::from_conf(sdk_config),
            cluster: config.cluster.clone(),
            task_definition: config.task_definition.clone(),
            container_name: config.container_name.clone(),
        }
    }
}

#[async_trait]
impl TaskLauncher for EcsLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<TaskHandle, DispatchError> {
        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(request.network_targets))
            .set_security_groups(Some(request.isolation_group))
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .map_err(|e| DispatchError::Rejected(format!("invalid network configuration: {}", e)))?;

        let environment = request
            .environment
            .into_iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect();

        let overrides = TaskOverride::builder()
            .container_overrides(
                ContainerOverride::builder()
                    .name(&self.container_name)
                    .set_environment(Some(environment))
                    .build(),
            )
            .build();

        let output = self
            .client
            .run_task()
            .cluster(&self.cluster)
            .task_definition(&self.task_definition)
            .launch_type(LaunchType::Fargate)
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(vpc)
                    .build(),
            )
            .overrides(overrides)
            .send()
            .await
            .map_err(|e| DispatchError::Unavailable(e.into_service_error().to_string()))?;

        if let Some(arn) = output.tasks().first().and_then(|t| t.task_arn()) {
            return Ok(TaskHandle(arn.to_string()));
        }

        let reasons: Vec<String> = output
            .failures()
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.arn().unwrap_or("task"),
                    f.reason().unwrap_or("unknown reason")
                )
            })
            .collect();
        warn!("❌ Task failed to start: {:?}", reasons);

        Err(DispatchError::Rejected(if reasons.is_empty() {
            "no task was started".to_string()
        } else {
            reasons.join("; ")
        }))
    }
}

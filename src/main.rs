use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hls_pipeline::common::telemetry::init_tracing;
use hls_pipeline::config::settings::{IntakeConfig, LauncherConfig};
use hls_pipeline::infrastructure::launcher::{EcsLauncher, ProcessLauncher};
use hls_pipeline::infrastructure::queue::rabbitmq::RabbitMqService;
use hls_pipeline::modules::dispatch::{RetryingDispatcher, TaskDispatcher, TaskLauncher};
use hls_pipeline::modules::intake::{ConsumerSettings, JobConsumer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    info!("Starting intake service...");

    let config = IntakeConfig::new().context("invalid intake configuration")?;
    info!(
        transient = %config.transient_bucket,
        durable = %config.durable_bucket,
        queue = %config.queue_name,
        "Intake configured"
    );

    let queue = RabbitMqService::new(
        &config.amqp_url,
        &config.queue_name,
        config.dead_letter_exchange.as_deref(),
    )
    .await
    .context("failed to connect to the upload queue")?;

    let launcher: Box<dyn TaskLauncher> = match &config.launcher {
        LauncherConfig::Ecs(ecs) => Box::new(EcsLauncher::new(ecs, &config.launch.region)),
        LauncherConfig::Process { binary } => Box::new(ProcessLauncher::new(binary.clone())),
    };
    let dispatcher = RetryingDispatcher::new(
        TaskDispatcher::new(launcher, config.launch.clone()),
        config.retry.clone(),
    );

    let consumer = JobConsumer::new(
        queue,
        dispatcher,
        ConsumerSettings {
            transient_bucket: config.transient_bucket.clone(),
            output_prefix_root: config.output_prefix_root.clone(),
            poll_wait: config.poll_wait,
            poll_interval: config.poll_interval,
        },
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown requested");
        signal_token.cancel();
    });

    consumer.run(shutdown).await;
    Ok(())
}

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info, warn};

use hls_pipeline::common::telemetry::init_tracing;
use hls_pipeline::config::settings::WorkerConfig;
use hls_pipeline::infrastructure::db::pool::connect_to_db;
use hls_pipeline::infrastructure::storage::s3::StorageService;
use hls_pipeline::modules::job::{Buckets, LogStatusSink, PgStatusSink, StatusSink, TranscodeJob};
use hls_pipeline::modules::storage::RetryingStorage;
use hls_pipeline::modules::transcode::{FfmpegEncoder, TranscodeEngine};
use hls_pipeline::workers::JobRunner;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    // A non-zero exit is how the scheduler learns the job failed.
    if let Err(e) = run().await {
        error!("❌ Worker failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::new().context("invalid worker configuration")?;
    info!(
        key = %config.job_key,
        output = %config.output_prefix,
        rungs = config.ladder.len(),
        "🎬 Transcode worker starting"
    );

    let storage = RetryingStorage::new(
        StorageService::new(&config.storage, config.upload_concurrency),
        config.retry.clone(),
    );
    let engine = TranscodeEngine::new(config.ladder.clone(), FfmpegEncoder::new(config.ffmpeg_path.clone()));

    let status: Box<dyn StatusSink> = match &config.database_url {
        Some(url) => match connect_to_db(url).await {
            Ok(pool) => Box::new(PgStatusSink::new(pool)),
            Err(e) => {
                warn!("Status database unavailable, logging status only: {}", e);
                Box::new(LogStatusSink)
            }
        },
        None => Box::new(LogStatusSink),
    };

    let runner = JobRunner::new(
        storage,
        engine,
        status,
        Buckets {
            transient: config.transient_bucket.clone(),
            durable: config.durable_bucket.clone(),
        },
        config.workspace_dir.clone(),
    );

    let job = TranscodeJob::new(config.job_key.clone(), config.output_prefix.clone());
    let report = runner.run(&job).await?;
    info!(files = report.uploaded_files, "✅ Published {}", report.master_key);
    Ok(())
}

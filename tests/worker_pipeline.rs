use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use hls_pipeline::modules::job::status::StatusError;
use hls_pipeline::modules::job::{Buckets, JobStatus, StatusSink, StatusUpdate, TranscodeJob};
use hls_pipeline::modules::storage::{
    ObjectStorage, PushSummary, StorageError, collect_upload_entries, publish_in_phases,
};
use hls_pipeline::modules::transcode::{
    EncodeError, ResolutionLadder, Rung, RungEncoder, TranscodeEngine, TranscodeError,
};
use hls_pipeline::workers::{JobError, JobRunner};

const TRANSIENT: &str = "video-temp";
const DURABLE: &str = "video-permanent";

/// Object store kept in memory, keyed by (bucket, key).
#[derive(Default)]
struct MemoryStorage {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    upload_order: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    /// Uploads of keys ending with this fail
    fail_upload: Option<&'static str>,
    fail_delete: bool,
}

impl MemoryStorage {
    fn with_upload(key: &str) -> Self {
        let storage = Self::default();
        storage.put(TRANSIENT, key, b"mp4 bytes");
        storage
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
    }

    fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        self.fetched.lock().unwrap().push(key.to_string());
        let body = self.get(bucket, key).ok_or_else(|| StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        std::fs::create_dir_all(local_path.parent().unwrap()).unwrap();
        std::fs::write(local_path, body).unwrap();
        Ok(())
    }

    async fn push_tree(
        &self,
        local_dir: &Path,
        bucket: &str,
        dest_prefix: &str,
    ) -> Result<PushSummary, StorageError> {
        let entries = collect_upload_entries(local_dir, dest_prefix)?;
        let keys = publish_in_phases(entries, 2, move |entry| async move {
            if self.fail_upload.is_some_and(|suffix| entry.key.ends_with(suffix)) {
                return Err(StorageError::UploadFailed {
                    path: entry.path,
                    bucket: bucket.to_string(),
                    key: entry.key,
                    reason: "access denied".to_string(),
                });
            }
            self.put(bucket, &entry.key, &std::fs::read(&entry.path).unwrap());
            self.upload_order.lock().unwrap().push(entry.key);
            Ok(())
        })
        .await?;
        Ok(PushSummary { keys })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        if self.fail_delete {
            return Err(StorageError::DeleteFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "service unavailable".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Writes a deterministic rung (manifest plus two segments) or fails the named rungs.
#[derive(Default)]
struct StubEncoder {
    fail: HashSet<String>,
}

#[async_trait]
impl RungEncoder for StubEncoder {
    async fn encode(&self, _input: &Path, rung: &Rung, rung_dir: &Path) -> Result<(), EncodeError> {
        if self.fail.contains(&rung.name) {
            return Err(EncodeError::Failed {
                status: "exit status: 1".into(),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        for i in 0..2 {
            std::fs::write(rung_dir.join(format!("segment_{:03}.ts", i)), format!("{}-{}", rung.name, i)).unwrap();
        }
        std::fs::write(rung_dir.join("index.m3u8"), "#EXTM3U\n").unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingSink {
    fn statuses(&self) -> Vec<JobStatus> {
        self.updates.lock().unwrap().iter().map(|u| u.status).collect()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn record(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

fn two_rungs() -> ResolutionLadder {
    ResolutionLadder::new(vec![
        Rung::new("480p", 854, 480, 1_600_000),
        Rung::new("144p", 256, 144, 400_000),
    ])
    .unwrap()
}

fn buckets() -> Buckets {
    Buckets {
        transient: TRANSIENT.to_string(),
        durable: DURABLE.to_string(),
    }
}

fn runner(
    storage: &Arc<MemoryStorage>,
    encoder: StubEncoder,
    sink: &Arc<RecordingSink>,
    workspace: &TempDir,
) -> JobRunner<Arc<MemoryStorage>, StubEncoder, Arc<RecordingSink>> {
    JobRunner::new(
        storage.clone(),
        TranscodeEngine::new(two_rungs(), encoder),
        sink.clone(),
        buckets(),
        workspace.path().to_path_buf(),
    )
}

#[tokio::test]
async fn successful_job_promotes_output_and_deletes_source() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::with_upload("1700000000_movie.mp4"));
    let sink = Arc::new(RecordingSink::default());
    let job = TranscodeJob::new("1700000000_movie.mp4", "hls/1700000000_movie");

    let report = runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&job)
        .await
        .unwrap();

    assert_eq!(report.master_key, "hls/1700000000_movie/master.m3u8");
    assert_eq!(report.uploaded_files, 7);
    assert_eq!(
        storage.keys(DURABLE),
        [
            "hls/1700000000_movie/144p/index.m3u8",
            "hls/1700000000_movie/144p/segment_000.ts",
            "hls/1700000000_movie/144p/segment_001.ts",
            "hls/1700000000_movie/480p/index.m3u8",
            "hls/1700000000_movie/480p/segment_000.ts",
            "hls/1700000000_movie/480p/segment_001.ts",
            "hls/1700000000_movie/master.m3u8",
        ]
    );

    let master = String::from_utf8(storage.get(DURABLE, &report.master_key).unwrap()).unwrap();
    assert_eq!(
        master,
        "#EXTM3U\n\
         #EXT-X-STREAM-INF:BANDWIDTH=1600000,RESOLUTION=854x480\n\
         480p/index.m3u8\n\
         #EXT-X-STREAM-INF:BANDWIDTH=400000,RESOLUTION=256x144\n\
         144p/index.m3u8\n"
    );

    assert_eq!(storage.upload_order.lock().unwrap().last().unwrap(), &report.master_key);
    assert!(storage.keys(TRANSIENT).is_empty());
    assert_eq!(sink.statuses(), [JobStatus::Processing, JobStatus::Completed]);
    let completed = sink.updates.lock().unwrap()[1].clone();
    assert_eq!(completed.output_prefix.as_deref(), Some("hls/1700000000_movie"));
}

#[tokio::test]
async fn failed_rung_publishes_nothing_and_keeps_source() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::with_upload("movie.mp4"));
    let sink = Arc::new(RecordingSink::default());
    let encoder = StubEncoder {
        fail: HashSet::from(["144p".to_string()]),
    };

    let err = runner(&storage, encoder, &sink, &workspace)
        .run(&TranscodeJob::new("movie.mp4", "hls/movie"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JobError::Transcode(TranscodeError::RungsFailed { total: 2, .. })
    ));
    assert!(storage.keys(DURABLE).is_empty());
    assert_eq!(storage.keys(TRANSIENT), ["movie.mp4"]);
    assert_eq!(sink.statuses(), [JobStatus::Processing, JobStatus::Failed]);
    let failed = sink.updates.lock().unwrap()[1].clone();
    assert!(failed.detail.unwrap().contains("144p"));
    assert_eq!(failed.output_prefix, None);
}

#[tokio::test]
async fn push_failure_midway_keeps_master_unpublished_and_source() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage {
        fail_upload: Some("144p/segment_001.ts"),
        ..MemoryStorage::with_upload("movie.mp4")
    });
    let sink = Arc::new(RecordingSink::default());

    let err = runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&TranscodeJob::new("movie.mp4", "hls/movie"))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Promote(StorageError::UploadFailed { .. })));
    assert!(storage.get(DURABLE, "hls/movie/master.m3u8").is_none());
    assert_eq!(storage.keys(TRANSIENT), ["movie.mp4"]);
    assert_eq!(sink.statuses(), [JobStatus::Processing, JobStatus::Failed]);
    assert_eq!(sink.updates.lock().unwrap()[1].output_prefix, None);
}

#[tokio::test]
async fn delete_failure_after_promotion_reports_usable_output() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage {
        fail_delete: true,
        ..MemoryStorage::with_upload("movie.mp4")
    });
    let sink = Arc::new(RecordingSink::default());

    let err = runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&TranscodeJob::new("movie.mp4", "hls/movie"))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::DeleteSource(StorageError::DeleteFailed { .. })));
    assert!(err.output_promoted());
    assert_eq!(storage.keys(DURABLE).len(), 7);
    assert!(storage.get(DURABLE, "hls/movie/master.m3u8").is_some());
    assert_eq!(storage.keys(TRANSIENT), ["movie.mp4"]);

    assert_eq!(sink.statuses(), [JobStatus::Processing, JobStatus::Failed]);
    let failed = sink.updates.lock().unwrap()[1].clone();
    assert_eq!(failed.output_prefix.as_deref(), Some("hls/movie"));
    assert!(failed.detail.unwrap().contains("promoted"));
}

#[tokio::test]
async fn missing_source_fails_the_job() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::default());
    let sink = Arc::new(RecordingSink::default());

    let err = runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&TranscodeJob::new("gone.mp4", "hls/gone"))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Fetch(StorageError::NotFound { .. })));
    assert!(storage.keys(DURABLE).is_empty());
}

#[tokio::test]
async fn non_mp4_upload_is_rejected_before_download() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::with_upload("clip.mkv"));
    let sink = Arc::new(RecordingSink::default());

    let err = runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&TranscodeJob::new("clip.mkv", "hls/clip"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JobError::Transcode(TranscodeError::UnsupportedContainer(_))
    ));
    assert!(storage.fetched.lock().unwrap().is_empty());
    assert_eq!(storage.keys(TRANSIENT), ["clip.mkv"]);
    assert_eq!(sink.statuses(), [JobStatus::Processing, JobStatus::Failed]);
}

#[tokio::test]
async fn rerunning_a_job_overwrites_with_identical_output() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::with_upload("movie.mp4"));
    let sink = Arc::new(RecordingSink::default());
    let job = TranscodeJob::new("movie.mp4", "hls/movie");

    runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&job)
        .await
        .unwrap();
    let first: Vec<_> = storage
        .keys(DURABLE)
        .into_iter()
        .map(|k| (k.clone(), storage.get(DURABLE, &k)))
        .collect();

    // A duplicate delivery of the same upload.
    storage.put(TRANSIENT, "movie.mp4", b"mp4 bytes");
    runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&job)
        .await
        .unwrap();
    let second: Vec<_> = storage
        .keys(DURABLE)
        .into_iter()
        .map(|k| (k.clone(), storage.get(DURABLE, &k)))
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn workspace_is_cleaned_up_after_each_run() {
    let workspace = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::with_upload("movie.mp4"));
    let sink = Arc::new(RecordingSink::default());

    runner(&storage, StubEncoder::default(), &sink, &workspace)
        .run(&TranscodeJob::new("movie.mp4", "hls/movie"))
        .await
        .unwrap();

    assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
}

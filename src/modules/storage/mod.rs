use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::common::retry::{RetryPolicy, Retryable, with_retry};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("download of s3://{bucket}/{key} failed: {reason}")]
    DownloadFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("upload of {path} to s3://{bucket}/{key} failed: {reason}")]
    UploadFailed {
        path: PathBuf,
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("delete of s3://{bucket}/{key} failed: {reason}")]
    DeleteFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::NotFound { .. })
    }
}

/// Outcome of a completed `push_tree`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSummary {
    /// Destination keys, sorted.
    pub keys: Vec<String>,
}

impl PushSummary {
    pub fn file_count(&self) -> usize {
        self.keys.len()
    }
}

/// Object-level operations the worker needs. Each is idempotent per object;
/// the fetch → push → delete ordering is the caller's responsibility.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Copies one object to `local_path`, creating parent directories.
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError>;

    /// Uploads every file below `local_dir`, keyed by its relative path under
    /// `dest_prefix`. Files directly in `local_dir` go last, after everything
    /// in subdirectories, so a root manifest never precedes what it lists.
    /// Returns only after all uploads succeeded.
    async fn push_tree(
        &self,
        local_dir: &Path,
        bucket: &str,
        dest_prefix: &str,
    ) -> Result<PushSummary, StorageError>;

    /// Removes exactly one object.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: ObjectStorage + ?Sized> ObjectStorage for std::sync::Arc<S> {
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        (**self).fetch(bucket, key, local_path).await
    }

    async fn push_tree(
        &self,
        local_dir: &Path,
        bucket: &str,
        dest_prefix: &str,
    ) -> Result<PushSummary, StorageError> {
        (**self).push_tree(local_dir, bucket, dest_prefix).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        (**self).delete(bucket, key).await
    }
}

/// A local file scheduled for upload and its destination key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    pub path: PathBuf,
    pub key: String,
    /// Sits directly in the pushed directory rather than a subdirectory
    pub top_level: bool,
}

/// Joins a prefix and a relative path with exactly one `/`.
pub fn object_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Lists regular files under `local_dir` (recursively, sorted by path) with
/// the key each one gets below `dest_prefix`.
pub fn collect_upload_entries(local_dir: &Path, dest_prefix: &str) -> Result<Vec<UploadEntry>, StorageError> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(local_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| StorageError::Io {
            context: format!("Failed to walk {}", local_dir.display()),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(local_dir)
            .map_err(|e| StorageError::Io {
                context: format!("{} is outside {}", entry.path().display(), local_dir.display()),
                source: std::io::Error::other(e),
            })?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        entries.push(UploadEntry {
            path: entry.path().to_path_buf(),
            key: object_key(dest_prefix, &relative),
            top_level: entry.depth() == 1,
        });
    }

    Ok(entries)
}

/// Splits entries into (subdirectory files, top-level files), the order
/// in which `push_tree` publishes them.
pub fn publish_phases(entries: Vec<UploadEntry>) -> (Vec<UploadEntry>, Vec<UploadEntry>) {
    entries.into_iter().partition(|e| !e.top_level)
}

/// Uploads `entries` with at most `concurrency` uploads in flight, nested
/// files first. Top-level files start only once every nested upload
/// succeeded, so a failure leaves the root manifest unpublished. Returns the
/// uploaded keys, sorted.
pub async fn publish_in_phases<F, Fut>(
    entries: Vec<UploadEntry>,
    concurrency: usize,
    upload: F,
) -> Result<Vec<String>, StorageError>
where
    F: Fn(UploadEntry) -> Fut,
    Fut: Future<Output = Result<(), StorageError>>,
{
    let mut keys: Vec<String> = entries.iter().map(|e| e.key.clone()).collect();
    let (nested, top_level) = publish_phases(entries);

    for phase in [nested, top_level] {
        // futures are lazy: nothing uploads until the buffer polls it
        let uploads: Vec<Fut> = phase.into_iter().map(&upload).collect();
        stream::iter(uploads)
            .buffer_unordered(concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;
    }

    keys.sort();
    Ok(keys)
}

/// Retries each storage operation according to `policy`.
pub struct RetryingStorage<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingStorage<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: ObjectStorage> ObjectStorage for RetryingStorage<S> {
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        with_retry(&self.policy, "fetch", || self.inner.fetch(bucket, key, local_path)).await
    }

    async fn push_tree(
        &self,
        local_dir: &Path,
        bucket: &str,
        dest_prefix: &str,
    ) -> Result<PushSummary, StorageError> {
        // Re-pushing the whole tree is safe: uploads overwrite by key.
        with_retry(&self.policy, "push_tree", || {
            self.inner.push_tree(local_dir, bucket, dest_prefix)
        })
        .await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        with_retry(&self.policy, "delete", || self.inner.delete(bucket, key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn object_key_joins_with_single_slash() {
        assert_eq!(object_key("hls/movie", "480p/index.m3u8"), "hls/movie/480p/index.m3u8");
        assert_eq!(object_key("hls/movie/", "/master.m3u8"), "hls/movie/master.m3u8");
        assert_eq!(object_key("", "master.m3u8"), "master.m3u8");
    }

    #[test]
    fn collects_nested_files_with_relative_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("480p")).unwrap();
        std::fs::write(dir.path().join("master.m3u8"), "m").unwrap();
        std::fs::write(dir.path().join("480p/index.m3u8"), "i").unwrap();
        std::fs::write(dir.path().join("480p/segment_000.ts"), "s").unwrap();

        let entries = collect_upload_entries(dir.path(), "hls/movie").unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();

        assert_eq!(
            keys,
            [
                "hls/movie/480p/index.m3u8",
                "hls/movie/480p/segment_000.ts",
                "hls/movie/master.m3u8",
            ]
        );
        assert_eq!(entries[2].path, dir.path().join("master.m3u8"));
        assert!(entries[2].top_level);
        assert!(!entries[0].top_level);
    }

    #[test]
    fn top_level_files_publish_last() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("144p")).unwrap();
        std::fs::write(dir.path().join("master.m3u8"), "m").unwrap();
        std::fs::write(dir.path().join("144p/index.m3u8"), "i").unwrap();

        let (nested, top) = publish_phases(collect_upload_entries(dir.path(), "p").unwrap());

        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].key, "p/144p/index.m3u8");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, "p/master.m3u8");
    }

    fn tree_with_rungs(dir: &Path, rungs: &[&str], segments: usize) {
        for rung in rungs {
            std::fs::create_dir_all(dir.join(rung)).unwrap();
            std::fs::write(dir.join(rung).join("index.m3u8"), "i").unwrap();
            for i in 0..segments {
                std::fs::write(dir.join(rung).join(format!("segment_{:03}.ts", i)), "s").unwrap();
            }
        }
        std::fs::write(dir.join("master.m3u8"), "m").unwrap();
    }

    #[tokio::test]
    async fn phased_publish_uploads_master_last() {
        let dir = TempDir::new().unwrap();
        tree_with_rungs(dir.path(), &["480p", "144p"], 2);
        let entries = collect_upload_entries(dir.path(), "hls/movie").unwrap();
        let uploaded = std::sync::Mutex::new(Vec::new());

        let keys = publish_in_phases(entries, 3, |entry| {
            let uploaded = &uploaded;
            async move {
                uploaded.lock().unwrap().push(entry.key);
                Ok(())
            }
        })
        .await
        .unwrap();

        let uploaded = uploaded.into_inner().unwrap();
        assert_eq!(keys.len(), 7);
        assert_eq!(uploaded.len(), 7);
        assert_eq!(uploaded.last().unwrap(), "hls/movie/master.m3u8");
    }

    #[tokio::test]
    async fn failed_nested_upload_never_publishes_master() {
        let dir = TempDir::new().unwrap();
        tree_with_rungs(dir.path(), &["720p", "480p", "144p"], 3);
        let entries = collect_upload_entries(dir.path(), "hls/movie").unwrap();
        let attempted = std::sync::Mutex::new(Vec::new());

        let err = publish_in_phases(entries, 2, |entry| {
            let attempted = &attempted;
            async move {
                let n = {
                    let mut attempted = attempted.lock().unwrap();
                    attempted.push(entry.key.clone());
                    attempted.len()
                };
                if n == 5 {
                    return Err(StorageError::UploadFailed {
                        path: entry.path,
                        bucket: "video-permanent".into(),
                        key: entry.key,
                        reason: "connection reset".into(),
                    });
                }
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::UploadFailed { .. }));
        let attempted = attempted.into_inner().unwrap();
        assert!(attempted.len() >= 5);
        assert!(!attempted.iter().any(|k| k == "hls/movie/master.m3u8"));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = collect_upload_entries(&dir.path().join("nope"), "x").unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ObjectStorage for Flaky {
        async fn fetch(&self, bucket: &str, key: &str, _: &Path) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::NotFound {
                bucket: bucket.into(),
                key: key.into(),
            })
        }

        async fn push_tree(&self, _: &Path, _: &str, _: &str) -> Result<PushSummary, StorageError> {
            unimplemented!()
        }

        async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::DeleteFailed {
                    bucket: bucket.into(),
                    key: key.into(),
                    reason: "connection reset".into(),
                });
            }
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn retrying_storage_retries_transient_failures() {
        let storage = RetryingStorage::new(
            Flaky {
                failures_left: AtomicU32::new(2),
                calls: AtomicU32::new(0),
            },
            policy(),
        );

        storage.delete("temp", "movie.mp4").await.unwrap();
        assert_eq!(storage.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retrying_storage_does_not_retry_missing_objects() {
        let storage = RetryingStorage::new(
            Flaky {
                failures_left: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            },
            policy(),
        );

        let err = storage
            .fetch("temp", "movie.mp4", Path::new("/tmp/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(storage.inner.calls.load(Ordering::SeqCst), 1);
    }
}

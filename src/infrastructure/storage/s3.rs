use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::settings::StorageConfig;
use crate::modules::storage::{
    ObjectStorage, PushSummary, StorageError, UploadEntry, collect_upload_entries, publish_in_phases,
};

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    upload_concurrency: usize,
}

impl StorageService {
    pub fn new(config: &StorageConfig, upload_concurrency: usize) -> Self {
        let credentials = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            // MinIO needs path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "✅ S3 client ready"
        );

        Self {
            client,
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    async fn upload_entry(&self, bucket: &str, entry: &UploadEntry) -> Result<(), StorageError> {
        let failed = |reason: String| StorageError::UploadFailed {
            path: entry.path.clone(),
            bucket: bucket.to_string(),
            key: entry.key.clone(),
            reason,
        };

        let body = ByteStream::from_path(&entry.path)
            .await
            .map_err(|e| failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(&entry.key)
            .body(body)
            .content_type(content_type_for(&entry.key))
            .send()
            .await
            .map_err(|e| failed(e.into_service_error().to_string()))?;

        debug!("Uploaded {} to s3://{}/{}", entry.path.display(), bucket, entry.key);
        Ok(())
    }
}

/// HLS types first; `mime_guess` maps `.ts` to TypeScript.
pub fn content_type_for(key: &str) -> String {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        _ => mime_guess::from_path(key)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

#[async_trait]
impl ObjectStorage for StorageService {
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        info!("⬇️ Downloading s3://{}/{}", bucket, key);

        let download_failed = |reason: String| StorageError::DownloadFailed {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref ctx) if matches!(ctx.err(), GetObjectError::NoSuchKey(_)) => {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                }
                other => download_failed(other.into_service_error().to_string()),
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    context: format!("Failed to create {}", parent.display()),
                    source,
                })?;
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|source| StorageError::Io {
                context: format!("Failed to create {}", local_path.display()),
                source,
            })?;

        let mut body = response.body;
        let mut written: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| download_failed(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|source| StorageError::Io {
                    context: format!("Failed to write {}", local_path.display()),
                    source,
                })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|source| StorageError::Io {
            context: format!("Failed to flush {}", local_path.display()),
            source,
        })?;

        info!("⬇️ Downloaded {} bytes to {}", written, local_path.display());
        Ok(())
    }

    async fn push_tree(
        &self,
        local_dir: &Path,
        bucket: &str,
        dest_prefix: &str,
    ) -> Result<PushSummary, StorageError> {
        let entries = collect_upload_entries(local_dir, dest_prefix)?;
        info!(
            files = entries.len(),
            "⬆️ Uploading {} to s3://{}/{}",
            local_dir.display(),
            bucket,
            dest_prefix
        );

        let keys = publish_in_phases(entries, self.upload_concurrency, move |entry| async move {
            self.upload_entry(bucket, &entry).await
        })
        .await?;

        info!("⬆️ Uploaded {} files to s3://{}/{}", keys.len(), bucket, dest_prefix);
        Ok(PushSummary { keys })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.into_service_error().to_string(),
            })?;

        info!("🗑️ Deleted s3://{}/{}", bucket, key);
        Ok(())
    }
}

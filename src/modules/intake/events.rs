use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("message body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message has no Records array")]
    MissingRecords,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// A freshly uploaded object, key already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub bucket: String,
    pub key: String,
}

/// Parses a storage-event notification. Records without the
/// `s3.bucket.name` / `s3.object.key` shape are skipped; a body that is not
/// JSON or has no `Records` array is an error.
pub fn parse_notification(body: &[u8]) -> Result<Vec<UploadedObject>, NotificationError> {
    let document: Value = serde_json::from_slice(body)?;

    let records = document
        .get("Records")
        .and_then(Value::as_array)
        .ok_or(NotificationError::MissingRecords)?;

    let mut objects = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let record = match S3EventRecord::deserialize(record) {
            Ok(record) => record,
            Err(e) => {
                warn!(index, "Skipping malformed event record: {}", e);
                continue;
            }
        };

        match decode_key(&record.s3.object.key) {
            Some(key) if !key.is_empty() => objects.push(UploadedObject {
                bucket: record.s3.bucket.name,
                key,
            }),
            _ => warn!(index, key = %record.s3.object.key, "Skipping record with undecodable key"),
        }
    }

    Ok(objects)
}

/// Event keys are form-encoded: `+` is a space, the rest is percent-encoded.
pub fn decode_key(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|key| key.into_owned())
}

/// Destination prefix for a key: `<root>/<key without extension>`.
/// Deterministic, so redelivered notifications publish to the same place.
pub fn output_prefix_for(root: &str, key: &str) -> String {
    let stem = match key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !stem.ends_with('/') && !ext.contains('/') => stem,
        _ => key,
    };
    let stem = stem.trim_matches('/');
    let root = root.trim_matches('/');

    if root.is_empty() {
        stem.to_string()
    } else {
        format!("{}/{}", root, stem)
    }
}

// Upload preservation.
// Originals are kept in object storage so a failed assessment can be re-run
// against the same file without the student uploading it again.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::content::{read_file_content, ExtractedContent, FileKind};
use crate::errors::AppError;

const UPLOAD_PREFIX: &str = "uploads";

/// Blob storage for uploaded originals.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<()>;

    /// `Ok(None)` when no object exists under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
}

pub struct S3UploadStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3UploadStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl UploadStore for S3UploadStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;
        info!("Uploaded original to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(anyhow::anyhow!("S3 download failed: {service_error}"));
            }
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| anyhow::anyhow!("S3 body read failed: {e}"))?;
        Ok(Some(body.into_bytes()))
    }
}

#[derive(Debug, Serialize)]
pub struct UploadReceipt {
    pub upload_key: String,
    pub kind: FileKind,
    pub filename: String,
    pub preview: Option<String>,
}

pub fn upload_key(username: &str, kind: FileKind) -> String {
    format!("{UPLOAD_PREFIX}/{username}/{}.{}", Uuid::new_v4(), kind.extension())
}

/// Extracts first, then stores. Unsupported files never reach storage.
pub async fn preserve_upload(
    store: &dyn UploadStore,
    username: &str,
    filename: &str,
    bytes: Bytes,
) -> Result<UploadReceipt, AppError> {
    let content = read_file_content(filename, bytes.clone())?;
    let kind = content.kind();
    let key = upload_key(username, kind);
    store
        .put(&key, kind.media_type(), bytes)
        .await
        .map_err(|e| AppError::S3(e.to_string()))?;

    Ok(UploadReceipt {
        upload_key: key,
        kind,
        filename: filename.to_string(),
        preview: content.preview(),
    })
}

/// Loads a previously preserved upload and re-extracts its content.
/// Keys outside the caller's own prefix are treated as missing.
pub async fn load_upload(
    store: &dyn UploadStore,
    username: &str,
    key: &str,
) -> Result<ExtractedContent, AppError> {
    let owned_prefix = format!("{UPLOAD_PREFIX}/{username}/");
    if !key.starts_with(&owned_prefix) || key.contains("..") {
        return Err(AppError::NotFound(format!("Upload '{key}' not found")));
    }

    let bytes = store
        .get(key)
        .await
        .map_err(|e| AppError::S3(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Upload '{key}' not found")))?;

    Ok(read_file_content(key, bytes)?)
}

/// In-memory upload store for handler tests.
#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryUploadStore {
        pub objects: Mutex<HashMap<String, Bytes>>,
    }

    #[async_trait]
    impl UploadStore for MemoryUploadStore {
        async fn put(&self, key: &str, _content_type: &str, bytes: Bytes) -> Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<Bytes>> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }
    }
}

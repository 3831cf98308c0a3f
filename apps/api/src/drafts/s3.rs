use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info};

use crate::cv::autosave::{DraftKey, DraftSink};
use crate::cv::document::EditableCV;
use crate::errors::AppError;

/// Draft blobs stored as JSON at `drafts/<user>/draft_<id>.json`.
pub struct S3DraftSink {
    s3: S3Client,
    bucket: String,
}

impl S3DraftSink {
    pub fn new(s3: S3Client, bucket: String) -> Self {
        Self { s3, bucket }
    }
}

#[async_trait]
impl DraftSink for S3DraftSink {
    async fn save(&self, key: &DraftKey, doc: &EditableCV) -> Result<(), AppError> {
        let body = serde_json::to_vec(doc).map_err(|e| AppError::Internal(e.into()))?;
        let object_key = key.object_key();
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::S3(format!("S3 upload failed: {e}")))?;
        info!("Saved draft to s3://{}/{}", self.bucket, object_key);
        Ok(())
    }

    async fn load(&self, key: &DraftKey) -> Result<Option<EditableCV>, AppError> {
        let object_key = key.object_key();
        let output = match self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    debug!("No draft at {object_key}");
                    return Ok(None);
                }
                return Err(AppError::S3(format!("S3 download failed: {service_error}")));
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::S3(format!("S3 read failed: {e}")))?
            .into_bytes();
        let doc = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Validation(format!("Stored draft is corrupt: {e}")))?;
        Ok(Some(doc))
    }

    async fn clear(&self, key: &DraftKey) -> Result<(), AppError> {
        let object_key = key.object_key();
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| AppError::S3(format!("S3 delete failed: {e}")))?;
        debug!("Cleared draft {object_key}");
        Ok(())
    }
}

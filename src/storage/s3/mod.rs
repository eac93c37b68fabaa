use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_smithy_runtime_api::http::Response;
use aws_smithy_types::DateTime as SmithyDateTime;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::config::ClientConfig;
use crate::storage::{
    ByteRange, ObjectPage, Storage, StorageTrait, UploadedPart, WrittenObject,
};
use crate::types::ObjectRecord;
use crate::types::error::S3mirrorError;

mod client_builder;

const DEFAULT_REGION: &str = "us-east-1";

const TRANSIENT_ERROR_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "InternalError",
    "ServiceUnavailable",
];

pub struct S3StorageFactory {}

impl S3StorageFactory {
    pub async fn create(client_config: &ClientConfig) -> Storage {
        S3Storage::boxed_new(Arc::new(client_config.create_client().await))
    }
}

#[derive(Clone)]
struct S3Storage {
    client: Arc<Client>,
}

impl S3Storage {
    fn boxed_new(client: Arc<Client>) -> Storage {
        Box::new(S3Storage { client })
    }

    fn region(&self) -> String {
        self.client
            .config()
            .region()
            .map(|region| region.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut buckets = Vec::new();
        let mut continuation_token = None;
        loop {
            let output = self
                .client
                .list_buckets()
                .set_continuation_token(continuation_token)
                .send()
                .await
                .map_err(|e| into_transfer_error(e, "list_buckets"))?;

            buckets.extend(
                output
                    .buckets()
                    .iter()
                    .filter_map(|bucket| bucket.name().map(str::to_string)),
            );

            continuation_token = output.continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        debug!(count = buckets.len(), "list_buckets() completed.");

        Ok(buckets)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e.as_service_error().is_some_and(|e| e.is_not_found())
                    || e.raw_response()
                        .is_some_and(|response| response.status().as_u16() == 404);
                if not_found {
                    return Ok(false);
                }
                Err(into_transfer_error(e, "head_bucket"))
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let region = self.region();
        let bucket_configuration = if region == DEFAULT_REGION {
            None
        } else {
            Some(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            )
        };

        let result = self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(bucket_configuration)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(bucket = bucket, region = region, "bucket created.");
                Ok(())
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                debug!(bucket = bucket, "bucket already owned by you.");
                Ok(())
            }
            Err(e) => Err(into_transfer_error(e, "create_bucket")),
        }
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "list_objects_v2"))?;

        let records = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectRecord::new(
                    key,
                    object.size().unwrap_or_default().max(0) as u64,
                    object.e_tag().map(str::to_string),
                    to_chrono_utc(object.last_modified()),
                ))
            })
            .collect();

        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        trace!(
            bucket = bucket,
            truncated = next_continuation_token.is_some(),
            "list_objects_v2() completed."
        );

        Ok(ObjectPage {
            records,
            next_continuation_token,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "head_object"))?;

        Ok(ObjectRecord::new(
            key,
            output.content_length().unwrap_or_default().max(0) as u64,
            output.e_tag().map(str::to_string),
            to_chrono_utc(output.last_modified()),
        ))
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.map(|range| range.to_range_header()))
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "get_object"))?;

        // a broken body stream is worth another attempt
        let body = output.body.collect().await.map_err(|e| {
            anyhow!(S3mirrorError::TransientTransferError(format!(
                "aws_sdk_s3::primitives::ByteStream::collect() failed: {e}"
            )))
        })?;

        Ok(body.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<String>,
    ) -> Result<WrittenObject> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_md5(content_md5)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "put_object"))?;

        Ok(WrittenObject {
            e_tag: output.e_tag().map(str::to_string),
            server_side_encryption: output.server_side_encryption().cloned(),
        })
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "create_multipart_upload"))?;

        output.upload_id().map(str::to_string).ok_or_else(|| {
            anyhow!(S3mirrorError::PermanentTransferError(
                "create_multipart_upload() returned no upload id.".to_string()
            ))
        })
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
        content_md5: Option<String>,
    ) -> Result<UploadedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .set_content_md5(content_md5)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "upload_part"))?;

        Ok(UploadedPart {
            part_number,
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<WrittenObject> {
        let completed_parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .set_e_tag(part.e_tag)
                    .part_number(part.part_number)
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "complete_multipart_upload"))?;

        Ok(WrittenObject {
            e_tag: output.e_tag().map(str::to_string),
            server_side_encryption: output.server_side_encryption().cloned(),
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "abort_multipart_upload"))?;

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| into_transfer_error(e, "delete_object"))?;

        Ok(())
    }
}

fn to_chrono_utc(date_time: Option<&SmithyDateTime>) -> DateTime<Utc> {
    date_time
        .and_then(|date_time| date_time.to_chrono_utc().ok())
        .unwrap_or_default()
}

/// Throttling, server-side failures and network errors are worth retrying.
/// Anything else, including authorization failures and missing keys, is not.
pub fn is_transient_sdk_error<E>(e: &SdkError<E, Response>) -> bool
where
    E: ProvideErrorMetadata,
{
    match e {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(service_error) => {
            let status = service_error.raw().status().as_u16();
            if 500 <= status || status == 429 {
                return true;
            }

            service_error
                .err()
                .code()
                .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code))
        }
        _ => false,
    }
}

fn into_transfer_error<E>(e: SdkError<E, Response>, operation: &str) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!(
        "aws_sdk_s3::client::{operation}() failed: {}",
        DisplayErrorContext(&e)
    );

    if is_transient_sdk_error(&e) {
        anyhow!(S3mirrorError::TransientTransferError(message))
    } else {
        anyhow!(S3mirrorError::PermanentTransferError(message))
    }
}

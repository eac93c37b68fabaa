use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use base64::Engine;
use base64::engine::general_purpose;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, trace};

use crate::config::TransferConfig;
use crate::storage::e_tag::{generate_e_tag_hash, is_verification_supported_sse, verify_e_tag};
use crate::storage::{ByteRange, Storage, UploadedPart, WrittenObject};
use crate::types::SyncStatistics::{ETagVerified, SyncBytes};
use crate::types::error::S3mirrorError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectRecord, SyncStatistics};

/// Copies one object from the source endpoint to the target endpoint,
/// through the client, as a single PUT or as a multipart upload.
#[derive(Clone)]
pub struct UploadManager {
    source: Storage,
    target: Storage,
    transfer_config: TransferConfig,
    disable_etag_verify: bool,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<SyncStatistics>,
}

struct CompletedUpload {
    written_object: WrittenObject,
    concatenated_md5_hash: Vec<u8>,
    parts_count: i64,
}

impl UploadManager {
    pub fn new(
        source: Storage,
        target: Storage,
        transfer_config: TransferConfig,
        disable_etag_verify: bool,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<SyncStatistics>,
    ) -> Self {
        UploadManager {
            source,
            target,
            transfer_config,
            disable_etag_verify,
            cancellation_token,
            stats_sender,
        }
    }

    /// Returns the number of bytes written to the target.
    pub async fn upload(&self, bucket: &str, source: &ObjectRecord) -> Result<u64> {
        if self
            .transfer_config
            .is_multipart_upload_required(source.size)
        {
            self.multipart_upload(bucket, source)
                .await
                .context("multipart_upload() failed.")?;
        } else {
            self.singlepart_upload(bucket, source)
                .await
                .context("singlepart_upload() failed.")?;
        }

        Ok(source.size)
    }

    async fn singlepart_upload(&self, bucket: &str, source: &ObjectRecord) -> Result<()> {
        let key = &source.key;
        let body = self.source.get_object(bucket, key, None).await?;

        if body.len() as u64 != source.size {
            return Err(anyhow!(S3mirrorError::PermanentTransferError(format!(
                "source object size changed after listing. expected: {}, actual: {}",
                source.size,
                body.len()
            ))));
        }

        let digest = md5::compute(&body);
        let content_md5 = general_purpose::STANDARD.encode(digest.as_slice());
        let len = body.len() as u64;

        let written_object = self
            .target
            .put_object(bucket, key, body, Some(content_md5))
            .await?;

        self.send_stats(SyncBytes(len)).await;

        self.verify_upload(
            bucket,
            key,
            &generate_e_tag_hash(digest.as_slice(), 0),
            written_object,
        )
        .await
    }

    async fn multipart_upload(&self, bucket: &str, source: &ObjectRecord) -> Result<()> {
        let key = &source.key;
        let upload_id = self.target.create_multipart_upload(bucket, key).await?;

        debug!(
            key = key,
            upload_id = upload_id,
            size = source.size,
            "multipart upload created."
        );

        let upload_result = self
            .upload_parts_and_complete(bucket, source, &upload_id)
            .await
            .context("upload_parts_and_complete() failed.");

        let completed_upload = match upload_result {
            Ok(completed_upload) => completed_upload,
            Err(e) => {
                self.abort_multipart_upload(bucket, key, &upload_id).await;
                return Err(e);
            }
        };

        self.verify_upload(
            bucket,
            key,
            &generate_e_tag_hash(
                &completed_upload.concatenated_md5_hash,
                completed_upload.parts_count,
            ),
            completed_upload.written_object,
        )
        .await
    }

    async fn upload_parts_and_complete(
        &self,
        bucket: &str,
        source: &ObjectRecord,
        upload_id: &str,
    ) -> Result<CompletedUpload> {
        let key = &source.key;
        let ranges = part_ranges(self.transfer_config.multipart_chunksize, source.size);

        let mut uploaded_parts = stream::iter(ranges.into_iter().enumerate())
            .map(|(index, range)| {
                self.transfer_part(bucket, key, upload_id, index as i32 + 1, range)
            })
            .buffer_unordered(self.transfer_config.max_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        if self.cancellation_token.is_cancelled() {
            return Err(anyhow!(S3mirrorError::Cancelled));
        }

        uploaded_parts.sort_by_key(|(part, _)| part.part_number);

        let mut concatenated_md5_hash = Vec::with_capacity(uploaded_parts.len() * 16);
        let mut parts = Vec::with_capacity(uploaded_parts.len());
        for (part, digest) in uploaded_parts {
            concatenated_md5_hash.extend_from_slice(digest.as_slice());
            parts.push(part);
        }
        let parts_count = parts.len() as i64;

        let written_object = self
            .target
            .complete_multipart_upload(bucket, key, upload_id, parts)
            .await?;

        debug!(
            key = key,
            upload_id = upload_id,
            parts_count = parts_count,
            "multipart upload completed."
        );

        Ok(CompletedUpload {
            written_object,
            concatenated_md5_hash,
            parts_count,
        })
    }

    async fn transfer_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        range: ByteRange,
    ) -> Result<(UploadedPart, md5::Digest)> {
        if self.cancellation_token.is_cancelled() {
            trace!(key = key, part_number = part_number, "part upload cancelled.");
            return Err(anyhow!(S3mirrorError::Cancelled));
        }

        let body = self
            .source
            .get_object(bucket, key, Some(range))
            .await
            .context("get_object() failed.")?;

        if body.len() as u64 != range.size {
            return Err(anyhow!(S3mirrorError::PermanentTransferError(format!(
                "part {part_number} of `{key}` is {} bytes, expected {}",
                body.len(),
                range.size
            ))));
        }

        let digest = md5::compute(&body);
        let content_md5 = general_purpose::STANDARD.encode(digest.as_slice());

        let uploaded_part = self
            .target
            .upload_part(bucket, key, upload_id, part_number, body, Some(content_md5))
            .await
            .context("upload_part() failed.")?;

        self.send_stats(SyncBytes(range.size)).await;

        trace!(
            key = key,
            upload_id = upload_id,
            part_number = part_number,
            size = range.size,
            "part uploaded."
        );

        Ok((uploaded_part, digest))
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) {
        match self
            .target
            .abort_multipart_upload(bucket, key, upload_id)
            .await
        {
            Ok(()) => {
                debug!(key = key, upload_id = upload_id, "multipart upload aborted.");
            }
            Err(e) => {
                let abort_error = S3mirrorError::MultipartAbortError {
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    message: format!("{e:#}"),
                };
                error!(
                    key = key,
                    upload_id = upload_id,
                    error = abort_error.to_string(),
                    "abort_multipart_upload() failed."
                );
            }
        }
    }

    async fn verify_upload(
        &self,
        bucket: &str,
        key: &str,
        expected_e_tag: &str,
        written_object: WrittenObject,
    ) -> Result<()> {
        if self.disable_etag_verify {
            return Ok(());
        }

        if !is_verification_supported_sse(&written_object.server_side_encryption) {
            debug!(
                key = key,
                server_side_encryption = ?written_object.server_side_encryption,
                "e_tag verification skipped. target e_tag is not a content hash."
            );
            return Ok(());
        }

        let target_e_tag = match written_object.e_tag {
            Some(e_tag) => Some(e_tag),
            None => self.target.head_object(bucket, key).await?.e_tag,
        };

        let expected_e_tag = Some(expected_e_tag.to_string());
        match verify_e_tag(&expected_e_tag, &target_e_tag) {
            Some(false) => Err(anyhow!(S3mirrorError::PermanentTransferError(format!(
                "e_tag mismatch. object in the target may be corrupted. expected: {}, actual: {}",
                expected_e_tag.unwrap_or_default(),
                target_e_tag.unwrap_or_default()
            )))),
            Some(true) => {
                self.send_stats(ETagVerified {
                    key: key.to_string(),
                })
                .await;

                trace!(key = key, e_tag = target_e_tag, "e_tag verified.");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn send_stats(&self, stats: SyncStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}

pub fn part_ranges(multipart_chunksize: u64, content_length: u64) -> Vec<ByteRange> {
    let chunksize = multipart_chunksize.max(1);
    (0..content_length)
        .step_by(chunksize as usize)
        .map(|offset| ByteRange::new(offset, chunksize.min(content_length - offset)))
        .collect()
}

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::types::ServerSideEncryption;
use dyn_clone::DynClone;

use crate::types::ObjectRecord;

pub mod e_tag;
pub mod limiter;
pub mod memory;
pub mod s3;
pub mod upload_manager;

pub type Storage = Box<dyn StorageTrait + Send + Sync>;

#[derive(Clone)]
pub struct StoragePair {
    pub source: Storage,
    pub target: Storage,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub records: Vec<ObjectRecord>,
    pub next_continuation_token: Option<String>,
}

/// Byte range of an object. `size` must be greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub size: u64,
}

impl ByteRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn last_byte(&self) -> u64 {
        self.offset + self.size - 1
    }

    /// HTTP `Range` header value. Both ends are inclusive.
    pub fn to_range_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.last_byte())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub e_tag: Option<String>,
}

/// What the target reports after an object has been written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WrittenObject {
    pub e_tag: Option<String>,
    pub server_side_encryption: Option<ServerSideEncryption>,
}

/// Operations the mirror needs from an object store endpoint.
///
/// Implementations must be cheap to clone. Clones share the same underlying client.
/// Errors that callers may retry are tagged with
/// [`S3mirrorError::TransientTransferError`](crate::types::error::S3mirrorError),
/// everything else is treated as permanent.
#[async_trait]
pub trait StorageTrait: DynClone {
    async fn list_buckets(&self) -> Result<Vec<String>>;
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage>;
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord>;
    async fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>)
    -> Result<Vec<u8>>;
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<String>,
    ) -> Result<WrittenObject>;
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
        content_md5: Option<String>,
    ) -> Result<UploadedPart>;
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<WrittenObject>;
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
    -> Result<()>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

dyn_clone::clone_trait_object!(StorageTrait);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header() {
        assert_eq!(ByteRange::new(0, 1).to_range_header(), "bytes=0-0");
        assert_eq!(
            ByteRange::new(8 * 1024 * 1024, 8 * 1024 * 1024).to_range_header(),
            "bytes=8388608-16777215"
        );
        assert_eq!(ByteRange::new(10, 5).last_byte(), 14);
    }
}

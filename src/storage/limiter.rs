use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::storage::{
    ByteRange, ObjectPage, Storage, StorageTrait, UploadedPart, WrittenObject,
};
use crate::types::ObjectRecord;

/// Caps the number of requests in flight against one endpoint.
///
/// Every clone shares the same permits, so the cap holds across all workers
/// and all part uploads of the run.
#[derive(Clone)]
pub struct RequestLimiter {
    inner: Storage,
    semaphore: Arc<Semaphore>,
}

impl RequestLimiter {
    pub fn boxed_new(inner: Storage, max_pool_connections: usize) -> Storage {
        Box::new(RequestLimiter {
            inner,
            semaphore: Arc::new(Semaphore::new(max_pool_connections.max(1))),
        })
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .context("tokio::sync::Semaphore::acquire() failed.")
    }
}

#[async_trait]
impl StorageTrait for RequestLimiter {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let _permit = self.acquire().await?;
        self.inner.list_buckets().await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let _permit = self.acquire().await?;
        self.inner.bucket_exists(bucket).await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.create_bucket(bucket).await
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let _permit = self.acquire().await?;
        self.inner
            .list_objects_page(bucket, continuation_token, max_keys)
            .await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        let _permit = self.acquire().await?;
        self.inner.head_object(bucket, key).await
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>> {
        let _permit = self.acquire().await?;
        self.inner.get_object(bucket, key, range).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<String>,
    ) -> Result<WrittenObject> {
        let _permit = self.acquire().await?;
        self.inner.put_object(bucket, key, body, content_md5).await
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let _permit = self.acquire().await?;
        self.inner.create_multipart_upload(bucket, key).await
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
        let _permit = self.acquire().await?;
        self.inner
            .upload_part(bucket, key, upload_id, part_number, body, content_md5)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<WrittenObject> {
        let _permit = self.acquire().await?;
        self.inner
            .complete_multipart_upload(bucket, key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.abort_multipart_upload(bucket, key, upload_id).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let _permit = self.acquire().await?;
        self.inner.delete_object(bucket, key).await
    }
}

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use std::time::Duration;

    use crate::storage::memory::MemoryStorage;

    use super::*;

    #[tokio::test]
    async fn request_limit_is_shared_between_clones() {
        init_dummy_tracing_subscriber();

        let memory = MemoryStorage::new().with_request_delay(Duration::from_millis(20));
        memory.insert_bucket("bucket1");
        for i in 0..10 {
            memory.insert_object("bucket1", &format!("key{i}"), vec![0; 10]);
        }

        let limited = RequestLimiter::boxed_new(memory.boxed(), 2);
        let tasks = (0..10).map(|i| {
            let storage = limited.clone();
            async move {
                storage
                    .get_object("bucket1", &format!("key{i}"), None)
                    .await
                    .unwrap()
            }
        });
        let bodies = join_all(tasks).await;

        assert_eq!(bodies.len(), 10);
        assert!(memory.max_in_flight() <= 2);
        assert_eq!(memory.request_count(), 10);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

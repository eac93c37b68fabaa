//! In-process object store with the S3 semantics the mirror relies on.
//!
//! Used by the test suites and useful for embedding. Faults can be injected per
//! operation so that retry, abort and isolation paths can be exercised without a network.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::types::ServerSideEncryption;
use base64::Engine;
use base64::engine::general_purpose;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::storage::e_tag::generate_e_tag_hash;
use crate::storage::{
    ByteRange, ObjectPage, Storage, StorageTrait, UploadedPart, WrittenObject,
};
use crate::types::ObjectRecord;
use crate::types::error::S3mirrorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    ListBuckets,
    BucketExists,
    CreateBucket,
    ListObjects,
    HeadObject,
    GetObject,
    PutObject,
    CreateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    DeleteObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Transient,
    Permanent,
}

/// Makes matching requests fail. `remaining == None` fails forever.
#[derive(Debug, Clone)]
pub struct FaultRule {
    operation: StorageOperation,
    bucket: Option<String>,
    key: Option<String>,
    part_number: Option<i32>,
    kind: FaultKind,
    remaining: Option<u32>,
}

impl FaultRule {
    pub fn new(operation: StorageOperation, kind: FaultKind) -> Self {
        Self {
            operation,
            bucket: None,
            key: None,
            part_number: None,
            kind,
            remaining: None,
        }
    }

    pub fn bucket(mut self, bucket: &str) -> Self {
        self.bucket = Some(bucket.to_string());
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn part_number(mut self, part_number: i32) -> Self {
        self.part_number = Some(part_number);
        self
    }

    pub fn times(mut self, count: u32) -> Self {
        self.remaining = Some(count);
        self
    }

    fn matches(
        &self,
        operation: StorageOperation,
        bucket: &str,
        key: Option<&str>,
        part_number: Option<i32>,
    ) -> bool {
        self.operation == operation
            && self.bucket.as_deref().is_none_or(|b| b == bucket)
            && self.key.as_deref().is_none_or(|k| Some(k) == key)
            && self.part_number.is_none_or(|p| Some(p) == part_number)
            && self.remaining.is_none_or(|remaining| 0 < remaining)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    e_tag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, (Vec<u8>, String)>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
    faults: Vec<FaultRule>,
    uploaded_parts: Vec<(String, String, i32)>,
    completed_uploads: usize,
    aborted_uploads: usize,
    put_count: usize,
    delete_count: usize,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: AtomicUsize,
}

struct InFlightGuard<'a> {
    counters: &'a Counters,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counters: &'a Counters) -> Self {
        counters.requests.fetch_add(1, Ordering::SeqCst);
        let current = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
    counters: Arc<Counters>,
    request_delay: Option<Duration>,
    server_side_encryption: Option<ServerSideEncryption>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request sleeps this long while holding its in-flight slot.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Encrypts every written object. With `aws:kms` the stored ETag is no
    /// longer derived from the content, as on S3.
    pub fn with_server_side_encryption(mut self, sse: ServerSideEncryption) -> Self {
        self.server_side_encryption = Some(sse);
        self
    }

    pub fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    pub fn insert_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    pub fn insert_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        let e_tag = simple_e_tag(&body);
        self.insert_object_with_e_tag(bucket, key, body, &e_tag);
    }

    /// Stores an object with an arbitrary ETag, as multipart uploads from other tools would leave.
    pub fn insert_object_with_e_tag(&self, bucket: &str, key: &str, body: Vec<u8>, e_tag: &str) {
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    e_tag: e_tag.to_string(),
                    last_modified: Utc::now(),
                },
            );
    }

    pub fn add_fault(&self, rule: FaultRule) {
        self.lock().faults.push(rule);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.lock().buckets.contains_key(bucket)
    }

    pub fn object_body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.body.clone())
    }

    pub fn e_tag(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.e_tag.clone())
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pending_upload_count(&self) -> usize {
        self.lock().uploads.len()
    }

    pub fn completed_upload_count(&self) -> usize {
        self.lock().completed_uploads
    }

    pub fn aborted_upload_count(&self) -> usize {
        self.lock().aborted_uploads
    }

    /// Part numbers accepted for `key`, in arrival order, across every upload attempt.
    pub fn uploaded_part_numbers(&self, bucket: &str, key: &str) -> Vec<i32> {
        self.lock()
            .uploaded_parts
            .iter()
            .filter(|(b, k, _)| b == bucket && k == key)
            .map(|(_, _, part_number)| *part_number)
            .collect()
    }

    pub fn put_count(&self) -> usize {
        self.lock().put_count
    }

    pub fn delete_count(&self) -> usize {
        self.lock().delete_count
    }

    pub fn request_count(&self) -> usize {
        self.counters.requests.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn stored_e_tag(&self, content_e_tag: String, parts_count: i64) -> String {
        match self.server_side_encryption {
            Some(ServerSideEncryption::AwsKms) | Some(ServerSideEncryption::AwsKmsDsse) => {
                let opaque = uuid::Uuid::new_v4().simple().to_string();
                if parts_count == 0 {
                    format!("\"{opaque}\"")
                } else {
                    format!("\"{opaque}-{parts_count}\"")
                }
            }
            _ => content_e_tag,
        }
    }

    fn written_object(&self, e_tag: String) -> WrittenObject {
        WrittenObject {
            e_tag: Some(e_tag),
            server_side_encryption: self.server_side_encryption.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn begin(&self) -> InFlightGuard<'_> {
        let guard = InFlightGuard::enter(&self.counters);
        if let Some(delay) = self.request_delay {
            tokio::time::sleep(delay).await;
        }
        guard
    }

    fn check_fault(
        &self,
        operation: StorageOperation,
        bucket: &str,
        key: Option<&str>,
        part_number: Option<i32>,
    ) -> Result<()> {
        let mut state = self.lock();
        let Some(rule) = state
            .faults
            .iter_mut()
            .find(|rule| rule.matches(operation, bucket, key, part_number))
        else {
            return Ok(());
        };

        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }

        trace!(
            operation = ?operation,
            bucket = bucket,
            key = key,
            "injected fault."
        );

        let message = format!("memory::{operation:?}() failed: injected fault.");
        Err(match rule.kind {
            FaultKind::Transient => anyhow!(S3mirrorError::TransientTransferError(message)),
            FaultKind::Permanent => anyhow!(S3mirrorError::PermanentTransferError(message)),
        })
    }
}

#[async_trait]
impl StorageTrait for MemoryStorage {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::ListBuckets, "", None, None)?;

        Ok(self.lock().buckets.keys().cloned().collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::BucketExists, bucket, None, None)?;

        Ok(self.has_bucket(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::CreateBucket, bucket, None, None)?;

        self.insert_bucket(bucket);
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::ListObjects, bucket, None, None)?;

        let state = self.lock();
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        let lower = match continuation_token.as_ref() {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Unbounded,
        };
        let mut range = objects.range((lower, Bound::Unbounded));

        let records: Vec<ObjectRecord> = range
            .by_ref()
            .take(max_keys.max(1) as usize)
            .map(|(key, object)| to_record(key, object))
            .collect();

        let next_continuation_token = if range.next().is_some() {
            records.last().map(|record| record.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            records,
            next_continuation_token,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::HeadObject, bucket, Some(key), None)?;

        let state = self.lock();
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let object = objects.get(key).ok_or_else(|| no_such_key(key))?;

        Ok(to_record(key, object))
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Vec<u8>> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::GetObject, bucket, Some(key), None)?;

        let state = self.lock();
        let objects = state.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let object = objects.get(key).ok_or_else(|| no_such_key(key))?;

        let Some(range) = range else {
            return Ok(object.body.clone());
        };

        let len = object.body.len() as u64;
        if range.size == 0 || len <= range.last_byte() {
            return Err(anyhow!(S3mirrorError::PermanentTransferError(format!(
                "memory::get_object() failed: InvalidRange {} of {len} bytes.",
                range.to_range_header()
            ))));
        }

        Ok(object.body[range.offset as usize..=range.last_byte() as usize].to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_md5: Option<String>,
    ) -> Result<WrittenObject> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::PutObject, bucket, Some(key), None)?;
        check_content_md5(&body, &content_md5)?;

        let mut state = self.lock();
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;

        let e_tag = self.stored_e_tag(simple_e_tag(&body), 0);
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                e_tag: e_tag.clone(),
                last_modified: Utc::now(),
            },
        );
        state.put_count += 1;

        Ok(self.written_object(e_tag))
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::CreateMultipartUpload, bucket, Some(key), None)?;

        let mut state = self.lock();
        if !state.buckets.contains_key(bucket) {
            return Err(no_such_bucket(bucket));
        }

        let upload_id = uuid::Uuid::new_v4().to_string();
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );

        Ok(upload_id)
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
        let _guard = self.begin().await;
        self.check_fault(
            StorageOperation::UploadPart,
            bucket,
            Some(key),
            Some(part_number),
        )?;
        check_content_md5(&body, &content_md5)?;

        let mut state = self.lock();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;

        let e_tag = simple_e_tag(&body);
        upload.parts.insert(part_number, (body, e_tag.clone()));
        state
            .uploaded_parts
            .push((bucket.to_string(), key.to_string(), part_number));

        Ok(UploadedPart {
            part_number,
            e_tag: Some(e_tag),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<WrittenObject> {
        let _guard = self.begin().await;
        self.check_fault(
            StorageOperation::CompleteMultipartUpload,
            bucket,
            Some(key),
            None,
        )?;

        let mut state = self.lock();
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;

        let mut body = Vec::new();
        let mut concatenated_md5_hash = Vec::new();
        for part in &parts {
            let Some((part_body, e_tag)) = upload.parts.get(&part.part_number) else {
                return Err(invalid_part(part.part_number));
            };
            if part.e_tag.as_deref() != Some(e_tag.as_str()) {
                return Err(invalid_part(part.part_number));
            }
            body.extend_from_slice(part_body);
            concatenated_md5_hash.extend_from_slice(md5::compute(part_body).as_slice());
        }

        let parts_count = parts.len() as i64;
        let e_tag = self.stored_e_tag(
            generate_e_tag_hash(&concatenated_md5_hash, parts_count),
            parts_count,
        );
        let (upload_bucket, upload_key) = (upload.bucket.clone(), upload.key.clone());

        state.uploads.remove(upload_id);
        state.completed_uploads += 1;
        state
            .buckets
            .get_mut(&upload_bucket)
            .ok_or_else(|| no_such_bucket(&upload_bucket))?
            .insert(
                upload_key,
                StoredObject {
                    body,
                    e_tag: e_tag.clone(),
                    last_modified: Utc::now(),
                },
            );

        Ok(self.written_object(e_tag))
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let _guard = self.begin().await;
        self.check_fault(
            StorageOperation::AbortMultipartUpload,
            bucket,
            Some(key),
            None,
        )?;

        let mut state = self.lock();
        state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;
        state.aborted_uploads += 1;

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let _guard = self.begin().await;
        self.check_fault(StorageOperation::DeleteObject, bucket, Some(key), None)?;

        let mut state = self.lock();
        state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .remove(key);
        state.delete_count += 1;

        Ok(())
    }
}

fn simple_e_tag(body: &[u8]) -> String {
    generate_e_tag_hash(md5::compute(body).as_slice(), 0)
}

fn to_record(key: &str, object: &StoredObject) -> ObjectRecord {
    ObjectRecord::new(
        key,
        object.body.len() as u64,
        Some(object.e_tag.clone()),
        object.last_modified,
    )
}

fn check_content_md5(body: &[u8], content_md5: &Option<String>) -> Result<()> {
    let Some(content_md5) = content_md5 else {
        return Ok(());
    };

    if general_purpose::STANDARD.encode(md5::compute(body).as_slice()) != *content_md5 {
        return Err(anyhow!(S3mirrorError::PermanentTransferError(
            "memory::put() failed: BadDigest.".to_string()
        )));
    }

    Ok(())
}

fn no_such_bucket(bucket: &str) -> anyhow::Error {
    anyhow!(S3mirrorError::PermanentTransferError(format!(
        "NoSuchBucket: {bucket}"
    )))
}

fn no_such_key(key: &str) -> anyhow::Error {
    anyhow!(S3mirrorError::PermanentTransferError(format!(
        "NoSuchKey: {key}"
    )))
}

fn no_such_upload(upload_id: &str) -> anyhow::Error {
    anyhow!(S3mirrorError::PermanentTransferError(format!(
        "NoSuchUpload: {upload_id}"
    )))
}

fn invalid_part(part_number: i32) -> anyhow::Error {
    anyhow!(S3mirrorError::PermanentTransferError(format!(
        "InvalidPart: {part_number}"
    )))
}

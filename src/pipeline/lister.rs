use anyhow::{Result, anyhow};
use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, trace};

use crate::storage::Storage;
use crate::types::error::S3mirrorError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{Inventory, ObjectRecord};

/// Lists one bucket at one endpoint.
pub struct InventoryLister {
    storage: Storage,
    bucket: String,
    max_keys: i32,
    cancellation_token: PipelineCancellationToken,
}

enum ListState {
    Next(Option<String>),
    Done,
}

impl InventoryLister {
    pub fn new(
        storage: Storage,
        bucket: &str,
        max_keys: i32,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            bucket: bucket.to_string(),
            max_keys,
            cancellation_token,
        }
    }

    /// Lazily pages through the bucket. Each call starts again from the first page.
    ///
    /// A page failure yields [`S3mirrorError::ListError`] and ends the sequence.
    /// Cancellation is checked before every page request.
    pub fn records(&self) -> impl Stream<Item = Result<ObjectRecord>> + Send + 'static {
        let storage = self.storage.clone();
        let bucket = self.bucket.clone();
        let max_keys = self.max_keys;
        let cancellation_token = self.cancellation_token.clone();

        stream::try_unfold(ListState::Next(None), move |state| {
            let storage = storage.clone();
            let bucket = bucket.clone();
            let cancellation_token = cancellation_token.clone();

            async move {
                let continuation_token = match state {
                    ListState::Next(continuation_token) => continuation_token,
                    ListState::Done => return Ok(None),
                };

                if cancellation_token.is_cancelled() {
                    return Err(anyhow!(S3mirrorError::Cancelled));
                }

                let page = storage
                    .list_objects_page(&bucket, continuation_token, max_keys)
                    .await
                    .map_err(|e| {
                        anyhow!(S3mirrorError::ListError {
                            bucket: bucket.clone(),
                            message: format!("{e:#}"),
                        })
                    })?;

                trace!(
                    bucket = bucket,
                    count = page.records.len(),
                    has_more = page.next_continuation_token.is_some(),
                    "object page listed."
                );

                let next_state = match page.next_continuation_token {
                    Some(next_continuation_token) => ListState::Next(Some(next_continuation_token)),
                    None => ListState::Done,
                };

                Ok(Some((
                    stream::iter(page.records.into_iter().map(Ok::<_, anyhow::Error>)),
                    next_state,
                )))
            }
        })
        .try_flatten()
    }

    /// Drains the listing into a snapshot.
    pub async fn build_inventory(&self) -> Result<Inventory> {
        trace!(bucket = self.bucket, "list objects has started.");

        let records: Vec<ObjectRecord> = self.records().try_collect().await?;
        let inventory = Inventory::from_records(&self.bucket, records);

        debug!(
            bucket = self.bucket,
            count = inventory.len(),
            total_size = inventory.total_size(),
            "list objects has been completed."
        );

        Ok(inventory)
    }
}

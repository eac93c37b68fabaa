use anyhow::{Context, Error, Result};
use tracing::{error, info, trace, warn};

use crate::pipeline::retry::{AttemptOutcome, AttemptState, backoff_delay, classify_error};
use crate::pipeline::stage::{SendResult, Stage};
use crate::storage::upload_manager::UploadManager;
use crate::types::SyncStatistics::SyncWarning;
use crate::types::{Action, ActionOutcome, TransferResult};

/// Executor worker. Takes actions off the shared queue until it is closed or the run is cancelled.
pub struct ObjectSyncer {
    worker_index: u16,
    base: Stage,
    upload_manager: UploadManager,
}

impl ObjectSyncer {
    pub fn new(base: Stage, worker_index: u16) -> Self {
        let upload_manager = UploadManager::new(
            base.source.clone(),
            base.target.clone(),
            base.config.transfer_config,
            base.config.disable_etag_verify,
            base.cancellation_token.clone(),
            base.stats_sender.clone(),
        );

        Self {
            worker_index,
            base,
            upload_manager,
        }
    }

    pub async fn sync(&self) -> Result<()> {
        trace!(worker_index = self.worker_index, "sync worker has started.");
        self.receive_and_sync().await
    }

    async fn receive_and_sync(&self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "sync worker has been cancelled.");
                    return Ok(());
                }
                recv_result = self.base.receiver.recv() => {
                    match recv_result {
                        Ok(action) => {
                            let outcome = self.sync_action_with_force_retry(action).await;
                            if self.base.send(outcome).await? == SendResult::Closed {
                                return Ok(());
                            }
                        },
                        Err(_) => {
                            // normal shutdown
                            trace!(worker_index = self.worker_index, "sync worker has been completed.");
                            break;
                        }
                    }
                },
            }
        }

        Ok(())
    }

    async fn sync_action_with_force_retry(&self, action: Action) -> ActionOutcome {
        let key = action.key().to_string();
        let kind = action.kind();

        if let Action::Skip(_) = action {
            return ActionOutcome::new(key, kind, TransferResult::SkippedByPolicy, 0);
        }

        if self.base.config.dry_run {
            return self.dry_run(&action);
        }

        let force_retry_config = self.base.config.force_retry_config;
        let max_attempts = force_retry_config.max_attempts();

        let mut state = AttemptState::Pending;
        let mut last_error: Option<Error> = None;
        let mut bytes = 0;

        loop {
            state = state.next(AttemptOutcome::Start, max_attempts);
            let AttemptState::Attempting(attempt) = state else {
                break;
            };

            match self.sync_action(&action).await {
                Ok(transferred) => {
                    bytes = transferred;
                    state = state.next(AttemptOutcome::Success, max_attempts);
                }
                Err(e) => {
                    state = state.next(classify_error(&e), max_attempts);

                    if let AttemptState::Retrying(next_attempt) = state {
                        self.base.set_warning();
                        self.base.send_stats(SyncWarning { key: key.clone() }).await;

                        warn!(
                            worker_index = self.worker_index,
                            key = key,
                            attempt = attempt,
                            error = e.to_string(),
                            source = e.source(),
                            "force retryable error has occurred."
                        );

                        tokio::select! {
                            _ = tokio::time::sleep(backoff_delay(force_retry_config.base_interval(), next_attempt)) => {},
                            _ = self.base.cancellation_token.cancelled() => {
                                state = state.next(AttemptOutcome::Cancelled, max_attempts);
                            }
                        }
                    }

                    last_error = Some(e);
                }
            }

            if state.is_terminal() {
                break;
            }
        }

        let Some(failure_kind) = state.failure_kind() else {
            return ActionOutcome::new(key, kind, TransferResult::Succeeded, bytes);
        };

        let message = last_error
            .as_ref()
            .map(|e| format!("{e:#}"))
            .unwrap_or_else(|| failure_kind.to_string());

        error!(
            worker_index = self.worker_index,
            bucket = self.base.bucket.as_str(),
            key = key,
            action = %kind,
            failure_kind = %failure_kind,
            error = message,
            source = last_error.as_ref().and_then(|e| e.source()),
            "sync failed."
        );

        ActionOutcome::new(
            key,
            kind,
            TransferResult::Failed {
                kind: failure_kind,
                message,
            },
            0,
        )
    }

    /// Returns the number of bytes written to the target.
    async fn sync_action(&self, action: &Action) -> Result<u64> {
        let bucket = &self.base.bucket;

        match action {
            Action::CopyNew(source) | Action::CopyChanged { source, .. } => self
                .upload_manager
                .upload(bucket, source)
                .await
                .context("UploadManager::upload() failed."),
            Action::DeleteExtraneous(target) => {
                self.base
                    .target
                    .delete_object(bucket, &target.key)
                    .await
                    .context("delete_object() failed.")?;
                Ok(0)
            }
            Action::Skip(_) => Ok(0),
        }
    }

    fn dry_run(&self, action: &Action) -> ActionOutcome {
        let bytes = match action {
            Action::CopyNew(source) | Action::CopyChanged { source, .. } => {
                info!(
                    worker_index = self.worker_index,
                    bucket = self.base.bucket.as_str(),
                    key = source.key.as_str(),
                    size = source.size,
                    "[dry-run] sync completed."
                );
                source.size
            }
            Action::DeleteExtraneous(target) => {
                info!(
                    worker_index = self.worker_index,
                    bucket = self.base.bucket.as_str(),
                    key = target.key.as_str(),
                    "[dry-run] delete completed."
                );
                0
            }
            Action::Skip(_) => 0,
        };

        ActionOutcome::new(action.key(), action.kind(), TransferResult::Succeeded, bytes)
    }
}

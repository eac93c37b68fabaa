use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use async_channel::Sender;
use tracing::{debug, info, trace};

use crate::Config;
use crate::pipeline::aggregator::ReportAggregator;
use crate::pipeline::stage::Stage;
use crate::pipeline::syncer::ObjectSyncer;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{Action, ActionOutcome, SyncPlan, SyncReport, SyncStatistics};

const ACTION_CHANNEL_CAPACITY: usize = 20000;
const OUTCOME_CHANNEL_CAPACITY: usize = 20000;

/// Runs a [`SyncPlan`] on a pool of `max_workers` workers.
pub struct TransferExecutor {
    config: Config,
    source: Storage,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<SyncStatistics>,
    has_warning: Arc<AtomicBool>,
}

impl TransferExecutor {
    pub fn new(
        config: Config,
        source: Storage,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<SyncStatistics>,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            cancellation_token,
            stats_sender,
            has_warning,
        }
    }

    /// Attempts every action and collects the outcomes. A failed action never stops the others.
    ///
    /// On cancellation no further actions are dispatched. In-flight actions finish or
    /// abort, and the returned report is partial.
    pub async fn execute(&self, plan: SyncPlan) -> Result<SyncReport> {
        let bucket = plan.bucket.clone();
        let action_count = plan.len() as u64;

        trace!(
            bucket = bucket,
            action_count = action_count,
            max_workers = self.config.max_workers,
            "transfer executor has started."
        );

        let (action_sender, action_receiver) =
            async_channel::bounded::<Action>(ACTION_CHANNEL_CAPACITY);
        let (outcome_sender, outcome_receiver) =
            async_channel::bounded::<ActionOutcome>(OUTCOME_CHANNEL_CAPACITY);

        let aggregator =
            ReportAggregator::new(&bucket, outcome_receiver, self.stats_sender.clone());
        let aggregator_handle = tokio::spawn(aggregator.aggregate());

        let mut worker_handles = Vec::with_capacity(self.config.max_workers as usize);
        for worker_index in 0..self.config.max_workers {
            let stage = Stage::new(
                self.config.clone(),
                &bucket,
                self.source.clone(),
                self.target.clone(),
                action_receiver.clone(),
                outcome_sender.clone(),
                self.cancellation_token.clone(),
                self.stats_sender.clone(),
                self.has_warning.clone(),
            );
            let object_syncer = ObjectSyncer::new(stage, worker_index);
            worker_handles.push(tokio::spawn(async move { object_syncer.sync().await }));
        }
        drop(action_receiver);
        drop(outcome_sender);

        let queued = self.dispatch(plan, action_sender).await;

        let mut worker_result = Ok(());
        for handle in worker_handles {
            let result = handle.await.context("sync worker task failed.").and_then(|r| r);
            if worker_result.is_ok() {
                worker_result = result;
            }
        }

        let mut report = aggregator_handle
            .await
            .context("report aggregator task failed.")?;
        worker_result?;

        report.not_dispatched = action_count.saturating_sub(report.processed());
        report.cancelled = self.cancellation_token.is_cancelled();

        if report.cancelled {
            info!(
                bucket = bucket,
                queued = queued,
                processed = report.processed(),
                not_dispatched = report.not_dispatched,
                "transfer executor has been cancelled."
            );
        } else {
            debug!(
                bucket = bucket,
                processed = report.processed(),
                "transfer executor has been completed."
            );
        }

        Ok(report)
    }

    /// Feeds the action queue until the plan is exhausted or the run is cancelled.
    /// Returns the number of queued actions.
    async fn dispatch(&self, plan: SyncPlan, action_sender: Sender<Action>) -> u64 {
        let mut queued = 0;

        for action in plan.actions {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    debug!(bucket = plan.bucket, "dispatching has been cancelled.");
                    break;
                }
                result = action_sender.send(action) => {
                    if result.is_err() {
                        // every worker has gone away
                        break;
                    }
                    queued += 1;
                }
            }
        }

        action_sender.close();
        queued
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::config::args::parse_from_args;
    use crate::storage::memory::{FaultKind, FaultRule, MemoryStorage, StorageOperation};
    use crate::types::token::create_pipeline_cancellation_token;
    use crate::types::{FailureKind, ObjectRecord};

    #[tokio::test]
    async fn execute_plan() {
        init_dummy_tracing_subscriber();

        let (source, target) = storages(&["a", "b", "c"]);
        target.insert_object("bucket1", "z", b"z".to_vec());

        let plan = SyncPlan {
            bucket: "bucket1".to_string(),
            actions: vec![
                Action::CopyNew(record(&source, "a")),
                Action::CopyChanged {
                    source: record(&source, "b"),
                    target: record(&source, "b"),
                },
                Action::Skip(record(&source, "c")),
                Action::DeleteExtraneous(record(&target, "z")),
            ],
        };

        let executor = executor(&source, &target, &[], create_pipeline_cancellation_token());
        let report = executor.execute(plan).await.unwrap();

        assert_eq!(report.copied, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.not_dispatched, 0);
        assert!(!report.cancelled);
        assert_eq!(target.object_keys("bucket1"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn failure_does_not_stop_other_actions() {
        init_dummy_tracing_subscriber();

        let keys: Vec<String> = (0..50).map(|i| format!("key{i:02}")).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (source, target) = storages(&key_refs);
        target.add_fault(
            FaultRule::new(StorageOperation::PutObject, FaultKind::Permanent).key("key07"),
        );

        let plan = SyncPlan {
            bucket: "bucket1".to_string(),
            actions: keys
                .iter()
                .map(|key| Action::CopyNew(record(&source, key)))
                .collect(),
        };

        let executor = executor(
            &source,
            &target,
            &["--max-workers", "4"],
            create_pipeline_cancellation_token(),
        );
        let report = executor.execute(plan).await.unwrap();

        assert_eq!(report.copied, 49);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].key, "key07");
        assert_eq!(report.failures[0].kind, FailureKind::Permanent);
        assert_eq!(target.object_keys("bucket1").len(), 49);
    }

    #[tokio::test]
    async fn empty_plan() {
        init_dummy_tracing_subscriber();

        let (source, target) = storages(&[]);

        let executor = executor(&source, &target, &[], create_pipeline_cancellation_token());
        let report = executor
            .execute(SyncPlan {
                bucket: "bucket1".to_string(),
                actions: vec![],
            })
            .await
            .unwrap();

        assert_eq!(report.processed(), 0);
        assert!(!report.has_failure());
    }

    #[tokio::test]
    async fn workers_are_bounded() {
        init_dummy_tracing_subscriber();

        let keys: Vec<String> = (0..20).map(|i| format!("key{i:02}")).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (source, _) = storages(&key_refs);
        let target = MemoryStorage::new().with_request_delay(Duration::from_millis(20));
        target.insert_bucket("bucket1");

        let plan = SyncPlan {
            bucket: "bucket1".to_string(),
            actions: keys
                .iter()
                .map(|key| Action::CopyNew(record(&source, key)))
                .collect(),
        };

        let executor = executor(
            &source,
            &target,
            &["--max-workers", "3", "--disable-etag-verify"],
            create_pipeline_cancellation_token(),
        );
        let report = executor.execute(plan).await.unwrap();

        assert_eq!(report.copied, 20);
        assert!(target.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn cancel_before_execute() {
        init_dummy_tracing_subscriber();

        let (source, target) = storages(&["a", "b"]);
        let cancellation_token = create_pipeline_cancellation_token();
        cancellation_token.cancel();

        let plan = SyncPlan {
            bucket: "bucket1".to_string(),
            actions: vec![
                Action::CopyNew(record(&source, "a")),
                Action::CopyNew(record(&source, "b")),
            ],
        };

        let executor = executor(&source, &target, &[], cancellation_token);
        let report = executor.execute(plan).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed(), 0);
        assert_eq!(report.not_dispatched, 2);
        assert!(target.object_keys("bucket1").is_empty());
    }

    #[tokio::test]
    async fn cancel_during_execute() {
        init_dummy_tracing_subscriber();

        let keys: Vec<String> = (0..100).map(|i| format!("key{i:03}")).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (source, _) = storages(&key_refs);
        let target = MemoryStorage::new().with_request_delay(Duration::from_millis(50));
        target.insert_bucket("bucket1");

        let plan = SyncPlan {
            bucket: "bucket1".to_string(),
            actions: keys
                .iter()
                .map(|key| Action::CopyNew(record(&source, key)))
                .collect(),
        };

        let cancellation_token = create_pipeline_cancellation_token();
        let executor = executor(
            &source,
            &target,
            &["--max-workers", "2", "--disable-etag-verify"],
            cancellation_token.clone(),
        );

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancellation_token.cancel();
        });

        let report = executor.execute(plan).await.unwrap();

        assert!(report.cancelled);
        assert!(0 < report.not_dispatched);
        assert_eq!(report.processed() + report.not_dispatched, 100);
        assert_eq!(
            report.copied as usize,
            target.object_keys("bucket1").len()
        );
    }

    #[tokio::test]
    async fn transient_failure_is_reported_as_exhausted() {
        init_dummy_tracing_subscriber();

        let (source, target) = storages(&["a"]);
        target.add_fault(FaultRule::new(StorageOperation::PutObject, FaultKind::Transient));

        let plan = SyncPlan {
            bucket: "bucket1".to_string(),
            actions: vec![Action::CopyNew(record(&source, "a"))],
        };

        let executor = executor(&source, &target, &[], create_pipeline_cancellation_token());
        let report = executor.execute(plan).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].kind, FailureKind::TransientExhausted);
        assert!(target.object_keys("bucket1").is_empty());
    }

    fn storages(keys: &[&str]) -> (MemoryStorage, MemoryStorage) {
        let source = MemoryStorage::new();
        source.insert_bucket("bucket1");
        for key in keys {
            source.insert_object("bucket1", key, key.as_bytes().to_vec());
        }

        let target = MemoryStorage::new();
        target.insert_bucket("bucket1");

        (source, target)
    }

    fn record(storage: &MemoryStorage, key: &str) -> ObjectRecord {
        let body = storage.object_body("bucket1", key).unwrap();
        ObjectRecord::new(
            key,
            body.len() as u64,
            storage.e_tag("bucket1", key),
            Utc::now(),
        )
    }

    fn executor(
        source: &MemoryStorage,
        target: &MemoryStorage,
        extra_args: &[&str],
        cancellation_token: PipelineCancellationToken,
    ) -> TransferExecutor {
        let mut args = vec!["s3mirror", "--force-retry-interval-milliseconds", "1"];
        args.extend_from_slice(extra_args);
        let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
        let (stats_sender, _stats_receiver) = async_channel::unbounded();

        TransferExecutor::new(
            config,
            source.boxed(),
            target.boxed(),
            cancellation_token,
            stats_sender,
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

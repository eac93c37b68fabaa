use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Error, Result};
use async_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::Config;
use crate::pipeline::diff_detector::{SizeDiffDetector, diff, diff_with};
use crate::pipeline::executor::TransferExecutor;
use crate::pipeline::lister::InventoryLister;
use crate::storage::{Storage, StoragePair};
use crate::types::error::is_cancelled_error;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ActionKind, BucketError, Inventory, RunReport, SyncReport, SyncStatistics};

pub mod diff_detector;
pub mod executor;
pub mod lister;
pub mod retry;

mod aggregator;
mod stage;
mod storage_factory;
mod syncer;

/// Mirrors every selected bucket from the source endpoint to the target endpoint.
///
/// Buckets are processed one after another. A bucket whose target cannot be prepared or
/// whose listing fails is recorded in the [`RunReport`] and skipped; the remaining buckets
/// still run.
pub struct Pipeline {
    config: Config,
    source: Storage,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<SyncStatistics>,
    stats_receiver: Receiver<SyncStatistics>,
    has_error: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    ready: bool,
}

impl Pipeline {
    /// Connects to both endpoints described by `config` through aws-sdk-s3.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let StoragePair { source, target } = storage_factory::create_storage_pair(&config).await;
        Self::with_storages(config, source, target, cancellation_token)
    }

    /// Uses the given endpoints. Both are wrapped in a `max_pool_connections` request limiter.
    pub fn with_storages(
        config: Config,
        source: Storage,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        let StoragePair { source, target } =
            storage_factory::limit_storage_pair(source, target, config.max_pool_connections);
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self {
            config,
            source,
            target,
            cancellation_token,
            stats_sender,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::<Error>::new())),
            ready: true,
        }
    }

    pub async fn run(&mut self) -> RunReport {
        if !self.ready {
            panic!("it can be executed only once.")
        }
        self.ready = false;

        let mut run_report = RunReport::default();

        let source_buckets = match self.verify_connections().await {
            Ok(source_buckets) => source_buckets,
            Err(e) => {
                log_error(
                    self.has_error.clone(),
                    self.errors.clone(),
                    e,
                    "connection verification failed.",
                );
                self.shutdown();
                return run_report;
            }
        };

        let buckets = self.resolve_buckets(&source_buckets, &mut run_report);
        if buckets.is_empty() {
            warn!("no bucket to synchronize.");
        }

        for bucket in buckets {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.sync_bucket(&bucket, &mut run_report).await {
                Ok(report) => {
                    let cancelled = report.cancelled;
                    run_report.bucket_reports.push(report);
                    if cancelled {
                        break;
                    }
                }
                Err(e) if is_cancelled_error(&e) => {
                    info!(bucket = bucket, "bucket sync has been cancelled.");
                    break;
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(
                        bucket = bucket,
                        error = message,
                        source = e.source(),
                        "bucket sync failed. skipping."
                    );
                    run_report.bucket_errors.push(BucketError { bucket, message });
                }
            }
        }

        run_report.cancelled = self.cancellation_token.is_cancelled();

        self.shutdown();

        run_report
    }

    /// Lists buckets on both endpoints. Returns the source bucket names.
    async fn verify_connections(&self) -> Result<Vec<String>> {
        let source_buckets = self
            .source
            .list_buckets()
            .await
            .context("failed to connect to the source endpoint.")?;
        let target_buckets = self
            .target
            .list_buckets()
            .await
            .context("failed to connect to the target endpoint.")?;

        debug!(
            source_bucket_count = source_buckets.len(),
            target_bucket_count = target_buckets.len(),
            "connection verified."
        );

        Ok(source_buckets)
    }

    /// `--bucket` values, or every source bucket, minus the excluded ones.
    /// Selected buckets missing from the source are reported and never created on the target.
    fn resolve_buckets(
        &self,
        source_buckets: &[String],
        run_report: &mut RunReport,
    ) -> Vec<String> {
        let candidates = if self.config.buckets.is_empty() {
            source_buckets.to_vec()
        } else {
            self.config.buckets.clone()
        };

        let mut buckets = Vec::with_capacity(candidates.len());
        for bucket in candidates {
            if self.config.is_excluded_bucket(&bucket) {
                info!(bucket = bucket, "bucket excluded.");
                run_report.excluded_buckets.push(bucket);
            } else if !source_buckets.contains(&bucket) {
                let message = format!("bucket `{bucket}` does not exist in the source.");
                error!(bucket = bucket, "source bucket not found. skipping.");
                run_report.bucket_errors.push(BucketError { bucket, message });
            } else {
                buckets.push(bucket);
            }
        }

        trace!(buckets = ?buckets, "buckets resolved.");

        buckets
    }

    async fn sync_bucket(&self, bucket: &str, run_report: &mut RunReport) -> Result<SyncReport> {
        info!(bucket = bucket, "bucket sync has started.");

        let target_exists = self.ensure_target_bucket(bucket, run_report).await?;

        let source_lister = InventoryLister::new(
            self.source.clone(),
            bucket,
            self.config.max_keys,
            self.cancellation_token.clone(),
        );
        let target_lister = InventoryLister::new(
            self.target.clone(),
            bucket,
            self.config.max_keys,
            self.cancellation_token.clone(),
        );

        let (source_inventory, target_inventory) = if target_exists {
            tokio::try_join!(
                source_lister.build_inventory(),
                target_lister.build_inventory()
            )?
        } else {
            (source_lister.build_inventory().await?, Inventory::new(bucket))
        };

        let plan = if self.config.check_size {
            diff_with(
                &source_inventory,
                &target_inventory,
                self.config.delete_extraneous,
                &SizeDiffDetector,
            )
        } else {
            diff(
                &source_inventory,
                &target_inventory,
                self.config.delete_extraneous,
            )
        };

        debug!(
            bucket = bucket,
            source_count = source_inventory.len(),
            target_count = target_inventory.len(),
            copy_new = plan.count(ActionKind::CopyNew),
            copy_changed = plan.count(ActionKind::CopyChanged),
            skip = plan.count(ActionKind::Skip),
            delete_extraneous = plan.count(ActionKind::DeleteExtraneous),
            transfer_size = plan.transfer_size(),
            "sync plan created."
        );

        let executor = TransferExecutor::new(
            self.config.clone(),
            self.source.clone(),
            self.target.clone(),
            self.cancellation_token.clone(),
            self.stats_sender.clone(),
            self.has_warning.clone(),
        );
        let report = executor
            .execute(plan)
            .await
            .context("TransferExecutor::execute() failed.")?;

        info!(
            bucket = bucket,
            copied = report.copied,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            bytes_transferred = report.bytes_transferred,
            cancelled = report.cancelled,
            "bucket sync has been completed."
        );

        Ok(report)
    }

    /// Returns whether the target bucket exists afterward. Dry runs never create it.
    async fn ensure_target_bucket(&self, bucket: &str, run_report: &mut RunReport) -> Result<bool> {
        if self
            .target
            .bucket_exists(bucket)
            .await
            .context("failed to check the target bucket.")?
        {
            return Ok(true);
        }

        if self.config.dry_run {
            info!(bucket = bucket, "[dry-run] target bucket created.");
            return Ok(false);
        }

        self.target
            .create_bucket(bucket)
            .await
            .context("failed to create the target bucket.")?;
        run_report.buckets_created += 1;

        info!(bucket = bucket, "target bucket created.");

        Ok(true)
    }

    fn shutdown(&self) {
        self.close_stats_sender();
    }

    pub fn get_stats_receiver(&self) -> Receiver<SyncStatistics> {
        self.stats_receiver.clone()
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    pub fn get_errors_and_consume(&self) -> Option<Vec<Error>> {
        if !self.has_error() {
            return None;
        }

        let mut error_list = self.errors.lock().unwrap();
        Some(error_list.drain(..).collect())
    }

    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }
}

fn log_error(
    has_error: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<Error>>>,
    e: Error,
    message: &str,
) {
    has_error.store(true, Ordering::SeqCst);

    let error = e.to_string();
    let source = e.source();

    error!(error = error, source = source, message);

    let mut error_list = errors.lock().unwrap();
    error_list.push_back(e);
}

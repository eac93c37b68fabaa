#![allow(dead_code)]

use std::time::Duration;

use async_channel::Receiver;

use s3mirror::Config;
use s3mirror::config::args::build_config_from_args;
use s3mirror::pipeline::Pipeline;
use s3mirror::storage::memory::MemoryStorage;
use s3mirror::types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
use s3mirror::types::{RunReport, SyncStatistics};

pub const BUCKET1: &str = "bucket1";
pub const BUCKET2: &str = "bucket2";
pub const BUCKET3: &str = "bucket3";

pub const MIB: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct StatsCount {
    pub sync_complete: u64,
    pub sync_skip: u64,
    pub sync_delete: u64,
    pub sync_error: u64,
    pub sync_warning: u64,
    pub etag_verified: u64,
    pub sync_bytes: u64,
}

pub struct TestHelper {
    pub source: MemoryStorage,
    pub target: MemoryStorage,
}

impl TestHelper {
    pub fn new() -> Self {
        Self {
            source: MemoryStorage::new(),
            target: MemoryStorage::new(),
        }
    }

    pub fn with_request_delay(delay: Duration) -> Self {
        Self {
            source: MemoryStorage::new().with_request_delay(delay),
            target: MemoryStorage::new().with_request_delay(delay),
        }
    }

    /// Fills a source bucket with `count` small objects named `object-0000`...
    pub fn fill_source_bucket(&self, bucket: &str, count: usize) {
        self.source.insert_bucket(bucket);
        for i in 0..count {
            self.source
                .insert_object(bucket, &format!("object-{i:04}"), format!("body-{i}").into_bytes());
        }
    }

    pub fn build_config(extra_args: &[&str]) -> Config {
        let mut args = vec![
            "s3mirror",
            "--source-access-key",
            "source_access_key",
            "--source-secret-access-key",
            "source_secret_access_key",
            "--target-access-key",
            "target_access_key",
            "--target-secret-access-key",
            "target_secret_access_key",
            "--source-region",
            "us-east-1",
            "--target-region",
            "us-west-2",
            "--force-retry-interval-milliseconds",
            "1",
        ];
        args.extend_from_slice(extra_args);

        build_config_from_args(args).unwrap()
    }

    pub fn create_pipeline(
        &self,
        config: Config,
        cancellation_token: PipelineCancellationToken,
    ) -> Pipeline {
        Pipeline::with_storages(
            config,
            self.source.boxed(),
            self.target.boxed(),
            cancellation_token,
        )
    }

    pub async fn run(&self, extra_args: &[&str]) -> (RunReport, Pipeline, StatsCount) {
        let mut pipeline = self.create_pipeline(
            Self::build_config(extra_args),
            create_pipeline_cancellation_token(),
        );
        let stats_receiver = pipeline.get_stats_receiver();

        let run_report = pipeline.run().await;
        let stats_count = Self::get_stats_count(stats_receiver);

        (run_report, pipeline, stats_count)
    }

    pub fn get_stats_count(stats_receiver: Receiver<SyncStatistics>) -> StatsCount {
        let mut stats = StatsCount::default();
        while let Ok(sync_stats) = stats_receiver.try_recv() {
            match sync_stats {
                SyncStatistics::SyncComplete { .. } => stats.sync_complete += 1,
                SyncStatistics::SyncSkip { .. } => stats.sync_skip += 1,
                SyncStatistics::SyncDelete { .. } => stats.sync_delete += 1,
                SyncStatistics::SyncError { .. } => stats.sync_error += 1,
                SyncStatistics::SyncWarning { .. } => stats.sync_warning += 1,
                SyncStatistics::ETagVerified { .. } => stats.etag_verified += 1,
                SyncStatistics::SyncBytes(size) => stats.sync_bytes += size,
            }
        }

        stats
    }

    /// Same keys, bodies and ETags on both sides.
    pub fn assert_mirrored(&self, bucket: &str) {
        let source_keys = self.source.object_keys(bucket);
        assert_eq!(source_keys, self.target.object_keys(bucket));

        for key in source_keys {
            assert_eq!(
                self.source.object_body(bucket, &key),
                self.target.object_body(bucket, &key),
                "body mismatch: {bucket}/{key}"
            );
        }
    }

    pub fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

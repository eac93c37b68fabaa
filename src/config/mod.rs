use std::path::PathBuf;
use std::time::Duration;

use crate::types::{ClientConfigLocation, S3Credentials};

pub mod args;

#[derive(Debug, Clone)]
pub struct Config {
    pub source_client_config: ClientConfig,
    pub target_client_config: ClientConfig,
    pub buckets: Vec<String>,
    pub exclude_buckets: Vec<String>,
    pub force_retry_config: ForceRetryConfig,
    pub tracing_config: Option<TracingConfig>,
    pub transfer_config: TransferConfig,
    pub max_workers: u16,
    pub max_pool_connections: usize,
    pub delete_extraneous: bool,
    pub check_size: bool,
    pub disable_etag_verify: bool,
    pub dry_run: bool,
    pub max_keys: i32,
    pub show_config: bool,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    pub fn is_excluded_bucket(&self, bucket: &str) -> bool {
        self.exclude_buckets.iter().any(|excluded| excluded == bucket)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
    pub log_file: Option<PathBuf>,
}

/// Retry policy applied to each action on top of the SDK's own retries.
#[derive(Debug, Clone, Copy)]
pub struct ForceRetryConfig {
    pub force_retry_count: u32,
    pub force_retry_interval_milliseconds: u64,
}

impl ForceRetryConfig {
    /// The first attempt plus `force_retry_count` retries.
    pub fn max_attempts(&self) -> u32 {
        self.force_retry_count.saturating_add(1)
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.force_retry_interval_milliseconds)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub multipart_threshold: u64,
    pub multipart_chunksize: u64,
    pub max_concurrency: usize,
}

impl TransferConfig {
    pub fn is_multipart_upload_required(&self, content_length: u64) -> bool {
        0 < content_length && self.multipart_threshold <= content_length
    }
}

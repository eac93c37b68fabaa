use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
#[cfg(feature = "version")]
use shadow_rs::shadow;

use crate::Config;
use crate::config::args::value_parser::{bucket_name, human_bytes, url};
use crate::config::{
    CLITimeoutConfig, ClientConfig, ForceRetryConfig, RetryConfig, TracingConfig, TransferConfig,
};
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials};

mod tests;
mod value_parser;

const DEFAULT_MAX_WORKERS: u16 = 20;
const DEFAULT_MAX_CONCURRENCY: u16 = 10;
const DEFAULT_MAX_POOL_CONNECTIONS: u16 = 50;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_FORCE_RETRY_COUNT: u32 = 2;
const DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS: u64 = 1000;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_MULTIPART_THRESHOLD: &str = "8MiB";
const DEFAULT_MULTIPART_CHUNKSIZE: &str = "8MiB";
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_NO_DELETE: bool = false;
const DEFAULT_CHECK_SIZE: bool = false;
const DEFAULT_DISABLE_ETAG_VERIFY: bool = false;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_SHOW_CONFIG: bool = false;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;

const BUCKET_SELECTED_AND_EXCLUDED: &str =
    "a bucket cannot be both selected with --bucket and excluded with --exclude-buckets\n";
const SAME_SOURCE_AND_TARGET_ENDPOINT: &str =
    "source and target must not be the same endpoint with the same credentials\n";
const MULTIPART_CHUNKSIZE_OVER_THRESHOLD: &str =
    "--multipart-chunksize must be smaller than or equal to --multipart-threshold\n";

#[cfg(feature = "version")]
shadow!(build);

#[derive(Parser, Clone, Debug)]
#[cfg_attr(feature = "version", command(version=format!("{} ({} {}), {}", build::PKG_VERSION, build::SHORT_COMMIT, build::BUILD_TARGET, build::RUST_VERSION)))]
pub struct CLIArgs {
    /// bucket to mirror. repeat or separate with commas. all source buckets when omitted
    #[arg(long, env, value_delimiter = ',', value_parser = bucket_name::check_bucket_name, help_heading = "General")]
    bucket: Vec<String>,

    /// buckets that are never mirrored
    #[arg(long, env, value_delimiter = ',', value_parser = bucket_name::check_bucket_name, help_heading = "General")]
    exclude_buckets: Vec<String>,

    /// A simulation mode. no actions will be performed
    #[arg(long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    dry_run: bool,

    /// print the resolved configuration and exit. secrets are redacted
    #[arg(long, env, default_value_t = DEFAULT_SHOW_CONFIG, help_heading = "General")]
    show_config: bool,

    /// location of the file that the AWS CLI uses to store configuration profiles
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_config_file: Option<PathBuf>,

    /// location of the file that the AWS CLI uses to store access keys
    #[arg(long, env, value_name = "FILE", help_heading = "AWS Configuration")]
    aws_shared_credentials_file: Option<PathBuf>,

    /// source AWS CLI profile
    #[arg(long, env, conflicts_with_all = ["source_access_key", "source_secret_access_key", "source_session_token"], help_heading = "AWS Configuration")]
    source_profile: Option<String>,

    /// source access key
    #[arg(long, env, conflicts_with_all = ["source_profile"], requires = "source_secret_access_key", help_heading = "AWS Configuration")]
    source_access_key: Option<String>,

    /// source secret access key
    #[arg(long, env, conflicts_with_all = ["source_profile"], requires = "source_access_key", help_heading = "AWS Configuration")]
    source_secret_access_key: Option<String>,

    /// source session token
    #[arg(long, env, conflicts_with_all = ["source_profile"], requires = "source_access_key", help_heading = "AWS Configuration")]
    source_session_token: Option<String>,

    /// target AWS CLI profile
    #[arg(long, env, conflicts_with_all = ["target_access_key", "target_secret_access_key", "target_session_token"], help_heading = "AWS Configuration")]
    target_profile: Option<String>,

    /// target access key
    #[arg(long, env, conflicts_with_all = ["target_profile"], requires = "target_secret_access_key", help_heading = "AWS Configuration")]
    target_access_key: Option<String>,

    /// target secret access key
    #[arg(long, env, conflicts_with_all = ["target_profile"], requires = "target_access_key", help_heading = "AWS Configuration")]
    target_secret_access_key: Option<String>,

    /// target session token
    #[arg(long, env, conflicts_with_all = ["target_profile"], requires = "target_access_key", help_heading = "AWS Configuration")]
    target_session_token: Option<String>,

    /// source region
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source Options")]
    source_region: Option<String>,

    /// source endpoint url
    #[arg(long, env, value_parser = url::check_scheme, help_heading = "Source Options")]
    source_endpoint_url: Option<String>,

    /// force path-style addressing for source endpoint
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Source Options")]
    source_force_path_style: bool,

    /// target region
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target Options")]
    target_region: Option<String>,

    /// target endpoint url
    #[arg(long, env, value_parser = url::check_scheme, help_heading = "Target Options")]
    target_endpoint_url: Option<String>,

    /// force path-style addressing for target endpoint
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Target Options")]
    target_force_path_style: bool,

    /// number of workers that copy and delete objects in parallel
    #[arg(long, env, default_value_t = DEFAULT_MAX_WORKERS, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    max_workers: u16,

    /// maximum number of part uploads in flight for one object
    #[arg(long, env, default_value_t = DEFAULT_MAX_CONCURRENCY, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    max_concurrency: u16,

    /// maximum number of requests in flight against each endpoint
    #[arg(long, env, default_value_t = DEFAULT_MAX_POOL_CONNECTIONS, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    max_pool_connections: u16,

    /// object size threshold that s3mirror uses for multipart upload
    #[arg(long, env, default_value = DEFAULT_MULTIPART_THRESHOLD, value_parser = human_bytes::check_human_bytes, help_heading = "Performance")]
    multipart_threshold: String,

    /// chunk size that s3mirror uses for multipart upload of individual files
    #[arg(long, env, default_value = DEFAULT_MULTIPART_CHUNKSIZE, value_parser = human_bytes::check_human_bytes, help_heading = "Performance")]
    multipart_chunksize: String,

    /// trace verbosity(-v: show info, -vv: show debug, -vvv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// show trace as json format
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// enable aws sdk tracing
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Tracing/Logging")]
    aws_sdk_tracing: bool,

    /// show span event tracing
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// write trace to the file instead of stdout
    #[arg(long, env, value_name = "FILE", help_heading = "Tracing/Logging")]
    log_file: Option<PathBuf>,

    /// maximum retry attempts that the aws sdk retry handler use
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, value_name = "max_attempts", help_heading = "Retry Options")]
    aws_max_attempts: u32,

    /// a multiplier value used when calculating backoff times as part of an exponential backoff with jitter strategy.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, value_name = "initial_backoff", help_heading = "Retry Options")]
    initial_backoff_milliseconds: u64,

    /// number of retries of a copy or delete after a transient error
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_COUNT, help_heading = "Retry Options")]
    force_retry_count: u32,

    /// base backoff (milliseconds) between retries. doubled on every retry, up to 30 seconds
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS, value_name = "force_retry_interval", help_heading = "Retry Options")]
    force_retry_interval_milliseconds: u64,

    /// operation timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_timeout",
        help_heading = "Timeout Options"
    )]
    operation_timeout_milliseconds: Option<u64>,

    /// operation attempt timeout (milliseconds). For details, see the AWS SDK for Rust TimeoutConfig documentation.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_attempt_timeout",
        help_heading = "Timeout Options"
    )]
    operation_attempt_timeout_milliseconds: Option<u64>,

    /// connect timeout (milliseconds).
    /// The default has AWS SDK default timeout (Currently 3100 milliseconds).
    #[arg(
        long,
        env,
        value_name = "connect_timeout",
        help_heading = "Timeout Options"
    )]
    connect_timeout_milliseconds: Option<u64>,

    /// read timeout (milliseconds).
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "read_timeout",
        help_heading = "Timeout Options"
    )]
    read_timeout_milliseconds: Option<u64>,

    /// compare sizes only. ETags are ignored
    #[arg(long, env, default_value_t = DEFAULT_CHECK_SIZE, help_heading = "Advanced")]
    check_size: bool,

    /// do not verify the ETag of uploaded objects
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_ETAG_VERIFY, help_heading = "Advanced")]
    disable_etag_verify: bool,

    /// maximum number of objects returned in a single list object request
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=32767), help_heading = "Advanced")]
    max_keys: i32,

    /// generate a auto completions script. Valid values: bash, fish, zsh, powershell, elvish.
    #[arg(long, env, value_name = "SHELL", value_parser = clap_complete::shells::Shell::from_str, help_heading = "Advanced")]
    auto_complete_shell: Option<clap_complete::shells::Shell>,

    /// disable stalled stream protection
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "Advanced")]
    disable_stalled_stream_protection: bool,

    /// keep objects that exist in the target but not in the source.
    /// without this flag such objects are deleted. test first with the --dry-run option
    #[arg(long, env, default_value_t = DEFAULT_NO_DELETE, help_heading = "Dangerous")]
    no_delete: bool,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    fn validate_config(&self) -> Result<(), String> {
        self.check_bucket_conflict()?;
        self.check_endpoint_conflict()?;
        self.check_multipart_chunksize()?;

        Ok(())
    }

    fn check_bucket_conflict(&self) -> Result<(), String> {
        if self
            .bucket
            .iter()
            .any(|bucket| self.exclude_buckets.contains(bucket))
        {
            return Err(BUCKET_SELECTED_AND_EXCLUDED.to_string());
        }

        Ok(())
    }

    fn check_endpoint_conflict(&self) -> Result<(), String> {
        if self.source_endpoint_url.is_none()
            || self.source_endpoint_url != self.target_endpoint_url
            || self.source_region != self.target_region
        {
            return Ok(());
        }

        if self.source_profile == self.target_profile
            && self.source_access_key == self.target_access_key
        {
            return Err(SAME_SOURCE_AND_TARGET_ENDPOINT.to_string());
        }

        Ok(())
    }

    fn check_multipart_chunksize(&self) -> Result<(), String> {
        let threshold = human_bytes::parse_human_bytes(&self.multipart_threshold)?;
        let chunksize = human_bytes::parse_human_bytes(&self.multipart_chunksize)?;
        if threshold < chunksize {
            return Err(MULTIPART_CHUNKSIZE_OVER_THRESHOLD.to_string());
        }

        Ok(())
    }

    fn build_credential(
        profile: &Option<String>,
        access_key: &Option<String>,
        secret_access_key: &Option<String>,
        session_token: &Option<String>,
    ) -> S3Credentials {
        if let Some(profile) = profile {
            return S3Credentials::Profile(profile.clone());
        }

        match (access_key, secret_access_key) {
            (Some(access_key), Some(secret_access_key)) => S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: secret_access_key.clone(),
                    session_token: session_token.clone(),
                },
            },
            _ => S3Credentials::FromEnvironment,
        }
    }

    fn build_client_configs(&self) -> (ClientConfig, ClientConfig) {
        let client_config_location = ClientConfigLocation {
            aws_config_file: self.aws_config_file.clone(),
            aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
        };
        let retry_config = RetryConfig {
            aws_max_attempts: self.aws_max_attempts,
            initial_backoff_milliseconds: self.initial_backoff_milliseconds,
        };
        let cli_timeout_config = CLITimeoutConfig {
            operation_timeout_milliseconds: self.operation_timeout_milliseconds,
            operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
            connect_timeout_milliseconds: self.connect_timeout_milliseconds,
            read_timeout_milliseconds: self.read_timeout_milliseconds,
        };

        let source_client_config = ClientConfig {
            client_config_location: client_config_location.clone(),
            credential: Self::build_credential(
                &self.source_profile,
                &self.source_access_key,
                &self.source_secret_access_key,
                &self.source_session_token,
            ),
            region: self.source_region.clone(),
            endpoint_url: self.source_endpoint_url.clone(),
            force_path_style: self.source_force_path_style,
            retry_config: retry_config.clone(),
            cli_timeout_config: cli_timeout_config.clone(),
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
        };

        let target_client_config = ClientConfig {
            client_config_location,
            credential: Self::build_credential(
                &self.target_profile,
                &self.target_access_key,
                &self.target_secret_access_key,
                &self.target_session_token,
            ),
            region: self.target_region.clone(),
            endpoint_url: self.target_endpoint_url.clone(),
            force_path_style: self.target_force_path_style,
            retry_config,
            cli_timeout_config,
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
        };

        (source_client_config, target_client_config)
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let tracing_level = match self.verbosity.log_level() {
            Some(log_level) if self.dry_run && log_level < log::Level::Info => log::Level::Info,
            Some(log_level) => log_level,
            // dry-run events must stay visible even with -qq
            None if self.dry_run => log::Level::Info,
            None => return None,
        };

        Some(TracingConfig {
            tracing_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
            log_file: self.log_file.clone(),
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        value.validate_config()?;

        let tracing_config = value.build_tracing_config();
        let (source_client_config, target_client_config) = value.build_client_configs();

        let mut buckets = Vec::with_capacity(value.bucket.len());
        for bucket in value.bucket {
            if !buckets.contains(&bucket) {
                buckets.push(bucket);
            }
        }

        Ok(Config {
            source_client_config,
            target_client_config,
            buckets,
            exclude_buckets: value.exclude_buckets,

            force_retry_config: ForceRetryConfig {
                force_retry_count: value.force_retry_count,
                force_retry_interval_milliseconds: value.force_retry_interval_milliseconds,
            },

            tracing_config,

            transfer_config: TransferConfig {
                multipart_threshold: human_bytes::parse_human_bytes(&value.multipart_threshold)?,
                multipart_chunksize: human_bytes::parse_human_bytes(&value.multipart_chunksize)?,
                max_concurrency: value.max_concurrency as usize,
            },

            max_workers: value.max_workers,
            max_pool_connections: value.max_pool_connections as usize,
            delete_extraneous: !value.no_delete,
            check_size: value.check_size,
            disable_etag_verify: value.disable_etag_verify,
            dry_run: value.dry_run,
            max_keys: value.max_keys,
            show_config: value.show_config,
            auto_complete_shell: value.auto_complete_shell,
        })
    }
}

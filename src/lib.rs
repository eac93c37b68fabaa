/*!
# Overview
s3mirror mirrors S3 buckets from one S3-compatible endpoint to another.
It copies new and changed objects, and deletes objects that no longer exist in the source,
so that every target bucket ends up with exactly the same objects as its source bucket.

## Features
- Multiple buckets
  Every bucket of the source endpoint is mirrored unless `--bucket` names some of them.
  `--exclude-buckets` removes buckets from the list. A missing target bucket is created.
  A bucket that cannot be listed is skipped and reported. The other buckets still run.

- Deterministic change detection
  Objects are compared by size and MD5 ETag, never by modification time, so clock skew
  between endpoints does not cause spurious copies. Multipart ETags are not content hashes
  and fall back to a size comparison.

- Multipart transfer
  Objects at or above `--multipart-threshold` are copied in `--multipart-chunksize` parts
  with up to `--max-concurrency` parts in flight. A failed part aborts the upload,
  so no incomplete upload is left on the target.

- Bounded parallelism
  `--max-workers` actions run in parallel. `--max-pool-connections` caps the requests in
  flight against each endpoint independently of the worker count.

- Partial failure tolerance
  Transient errors are retried with exponential backoff. A failed object never stops the
  others. Every failure is itemized in the report, and rerunning converges to the same state.

## As a library
s3mirror CLI is a thin wrapper of the s3mirror library.
Arguments are converted to [`Config`] in the same way as the CLI does.

Example usage
=============

```Toml
[dependencies]
s3mirror = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3mirror::config::Config;
use s3mirror::config::args::parse_from_args;
use s3mirror::pipeline::Pipeline;
use s3mirror::types::SyncStatistics;
use s3mirror::types::token::create_pipeline_cancellation_token;

#[tokio::main]
async fn main() {
    let args = vec![
        "program_name",
        "--source-profile",
        "source",
        "--target-profile",
        "target",
        "--exclude-buckets",
        "logs-bucket",
    ];

    let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

    // The token can be cancelled from another task to stop the run.
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = Pipeline::new(config, cancellation_token).await;
    let stats_receiver = pipeline.get_stats_receiver();

    let run_report = pipeline.run().await;

    let mut total_sync_count = 0;
    while let Ok(sync_stats) = stats_receiver.try_recv() {
        if matches!(sync_stats, SyncStatistics::SyncComplete { .. }) {
            total_sync_count += 1;
        }
    }
    println!("Total sync count: {total_sync_count}");

    if pipeline.has_error() {
        println!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }

    for report in &run_report.bucket_reports {
        for failure in &report.failures {
            println!("{}/{}: {} {}", report.bucket, failure.key, failure.kind, failure.message);
        }
    }
    for bucket_error in &run_report.bucket_errors {
        println!("{}: {}", bucket_error.bucket, bucket_error.message);
    }
}
```
*/

pub use config::Config;
pub use config::args::CLIArgs;

pub mod config;
pub mod pipeline;
pub mod storage;
pub mod types;

use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Local};
use indicatif::{HumanBytes, HumanDuration};
use tracing::info;

use s3mirror::types::RunReport;

use super::indicator::ProgressTotals;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct RunSummary<'a> {
    pub run_report: &'a RunReport,
    pub progress_totals: ProgressTotals,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed: Duration,
    pub has_error: bool,
}

impl RunSummary<'_> {
    pub fn status(&self) -> &'static str {
        if self.run_report.cancelled {
            "CANCELLED"
        } else if self.has_error || self.run_report.has_failure() {
            "COMPLETED WITH ERRORS"
        } else {
            "COMPLETED SUCCESSFULLY"
        }
    }

    fn bytes_per_sec(&self) -> u64 {
        let elapsed_secs = self.elapsed.as_secs_f64();
        if elapsed_secs <= 0.0 {
            return self.run_report.bytes_transferred();
        }

        (self.run_report.bytes_transferred() as f64 / elapsed_secs) as u64
    }

    fn not_dispatched(&self) -> u64 {
        self.run_report
            .bucket_reports
            .iter()
            .map(|report| report.not_dispatched)
            .sum()
    }

    pub fn log(&self) {
        info!(
            started_at = %self.started_at.format(TIMESTAMP_FORMAT),
            finished_at = %self.finished_at.format(TIMESTAMP_FORMAT),
            duration_sec = self.elapsed.as_secs_f64(),
            buckets_processed = self.run_report.buckets_processed(),
            buckets_created = self.run_report.buckets_created,
            buckets_skipped = self.run_report.buckets_skipped(),
            buckets_excluded = self.run_report.excluded_buckets.len(),
            copied = self.run_report.copied(),
            deleted = self.run_report.deleted(),
            skipped = self.run_report.skipped(),
            failed = self.run_report.failed(),
            not_dispatched = self.not_dispatched(),
            retried = self.progress_totals.retried,
            etag_verified = self.progress_totals.e_tag_verified,
            transferred_byte = self.run_report.bytes_transferred(),
            transferred_byte_per_sec = self.bytes_per_sec(),
            status = self.status(),
            "mirror summary."
        );
    }

    pub fn format(&self) -> String {
        let run_report = self.run_report;
        let mut text = String::new();

        let _ = writeln!(text, "Started:     {}", self.started_at.format(TIMESTAMP_FORMAT));
        let _ = writeln!(text, "Finished:    {}", self.finished_at.format(TIMESTAMP_FORMAT));
        let _ = writeln!(text, "Duration:    {}", HumanDuration(self.elapsed));
        let _ = writeln!(
            text,
            "Buckets:     {} processed, {} created, {} skipped, {} excluded",
            run_report.buckets_processed(),
            run_report.buckets_created,
            run_report.buckets_skipped(),
            run_report.excluded_buckets.len(),
        );
        let _ = writeln!(
            text,
            "Objects:     {} copied, {} deleted, {} skipped, {} failed",
            run_report.copied(),
            run_report.deleted(),
            run_report.skipped(),
            run_report.failed(),
        );
        let _ = writeln!(
            text,
            "Transferred: {} ({}/sec), {} retries, {} etag verified",
            HumanBytes(run_report.bytes_transferred()),
            HumanBytes(self.bytes_per_sec()),
            self.progress_totals.retried,
            self.progress_totals.e_tag_verified,
        );

        let not_dispatched = self.not_dispatched();
        if 0 < not_dispatched {
            let _ = writeln!(text, "Not started: {not_dispatched} actions");
        }

        if !run_report.bucket_errors.is_empty() || 0 < run_report.failed() {
            let _ = writeln!(text, "Failures:");
            for bucket_error in &run_report.bucket_errors {
                let _ = writeln!(text, "  {}: {}", bucket_error.bucket, bucket_error.message);
            }
            for report in &run_report.bucket_reports {
                for failure in &report.failures {
                    let _ = writeln!(
                        text,
                        "  {}/{}: {} ({}) {}",
                        report.bucket, failure.key, failure.action, failure.kind, failure.message
                    );
                }
            }
        }

        text.push_str(self.status());
        text
    }
}

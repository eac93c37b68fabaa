#[cfg(test)]
mod common;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use s3mirror::types::token::create_pipeline_cancellation_token;

    use common::*;

    use super::*;

    const REQUEST_DELAY_MILLIS: u64 = 20;
    const OBJECT_COUNT: usize = 200;

    #[tokio::test]
    async fn cancel_before_run() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper = TestHelper::new();
        helper.fill_source_bucket(BUCKET1, 10);

        let cancellation_token = create_pipeline_cancellation_token();
        cancellation_token.cancel();

        let mut pipeline =
            helper.create_pipeline(TestHelper::build_config(&[]), cancellation_token);
        let run_report = pipeline.run().await;

        assert!(run_report.cancelled);
        assert!(run_report.bucket_reports.is_empty());
        assert!(!pipeline.has_error());
        assert_eq!(helper.target.put_count(), 0);
    }

    #[tokio::test]
    async fn cancel_during_transfer_returns_partial_report() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper =
            TestHelper::with_request_delay(Duration::from_millis(REQUEST_DELAY_MILLIS));
        helper.fill_source_bucket(BUCKET1, OBJECT_COUNT);
        helper.fill_source_bucket(BUCKET2, 10);
        helper.target.insert_bucket(BUCKET1);

        let cancellation_token = create_pipeline_cancellation_token();
        let mut pipeline = helper.create_pipeline(
            TestHelper::build_config(&[
                "--max-workers",
                "2",
                "--bucket",
                BUCKET1,
                "--bucket",
                BUCKET2,
            ]),
            cancellation_token.clone(),
        );

        let target = helper.target.clone();
        let canceller = tokio::spawn(async move {
            while target.put_count() < 5 {
                tokio::time::sleep(Duration::from_millis(REQUEST_DELAY_MILLIS)).await;
            }
            cancellation_token.cancel();
        });

        let run_report = pipeline.run().await;
        canceller.await.unwrap();

        assert!(run_report.cancelled);
        assert!(!pipeline.has_error());
        assert_eq!(run_report.bucket_reports.len(), 1);
        assert!(run_report.report(BUCKET2).is_none());
        assert!(!helper.target.has_bucket(BUCKET2));

        let report = run_report.report(BUCKET1).unwrap();
        assert!(report.cancelled);
        assert!(0 < report.copied);
        assert!(0 < report.not_dispatched);
        assert_eq!(report.processed() + report.not_dispatched, OBJECT_COUNT as u64);
        assert_eq!(
            helper.target.object_keys(BUCKET1).len() as u64,
            report.copied
        );
    }

    #[tokio::test]
    async fn cancel_during_multipart_upload_leaves_no_pending_upload() {
        TestHelper::init_dummy_tracing_subscriber();

        let helper =
            TestHelper::with_request_delay(Duration::from_millis(REQUEST_DELAY_MILLIS));
        helper
            .source
            .insert_object(BUCKET1, "large_object", vec![3u8; 20 * MIB]);
        helper.target.insert_bucket(BUCKET1);

        let cancellation_token = create_pipeline_cancellation_token();
        let mut pipeline = helper.create_pipeline(
            TestHelper::build_config(&[
                "--multipart-threshold",
                "5MiB",
                "--multipart-chunksize",
                "5MiB",
                "--max-concurrency",
                "1",
            ]),
            cancellation_token.clone(),
        );

        let target = helper.target.clone();
        let canceller = tokio::spawn(async move {
            while target.uploaded_part_numbers(BUCKET1, "large_object").is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancellation_token.cancel();
        });

        let run_report = pipeline.run().await;
        canceller.await.unwrap();

        assert!(run_report.cancelled);
        assert!(run_report.has_failure());
        assert_eq!(helper.target.pending_upload_count(), 0);
        assert_eq!(helper.target.aborted_upload_count(), 1);
        assert_eq!(helper.target.completed_upload_count(), 0);
        assert!(helper.target.object_body(BUCKET1, "large_object").is_none());
        assert!(
            helper
                .target
                .uploaded_part_numbers(BUCKET1, "large_object")
                .len()
                < 4
        );
    }
}

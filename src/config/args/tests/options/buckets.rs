#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror"];

        let config = build_config_from_args(args).unwrap();

        assert!(config.buckets.is_empty());
        assert!(config.exclude_buckets.is_empty());
        assert!(config.delete_extraneous);
    }

    #[test]
    fn with_buckets() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--bucket",
            "bucket1,bucket2",
            "--bucket",
            "bucket3",
            "--bucket",
            "bucket1",
            "--exclude-buckets",
            "bucket4,bucket5",
            "--no-delete",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(config.buckets, vec!["bucket1", "bucket2", "bucket3"]);
        assert_eq!(config.exclude_buckets, vec!["bucket4", "bucket5"]);
        assert!(config.is_excluded_bucket("bucket4"));
        assert!(!config.is_excluded_bucket("bucket1"));
        assert!(!config.delete_extraneous);
    }

    #[test]
    fn invalid_bucket_name() {
        init_dummy_tracing_subscriber();

        assert!(parse_from_args(vec!["s3mirror", "--bucket", "Invalid_Bucket"]).is_err());
        assert!(parse_from_args(vec!["s3mirror", "--exclude-buckets", "ab"]).is_err());
    }

    #[test]
    fn bucket_selected_and_excluded() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--bucket",
            "bucket1,bucket2",
            "--exclude-buckets",
            "bucket2",
        ];

        let result = build_config_from_args(args);

        assert_eq!(result.unwrap_err(), BUCKET_SELECTED_AND_EXCLUDED.to_string());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

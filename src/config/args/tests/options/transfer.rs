#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "--bucket", "bucket1"];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(config.transfer_config.multipart_threshold, 8 * 1024 * 1024);
        assert_eq!(config.transfer_config.multipart_chunksize, 8 * 1024 * 1024);
        assert_eq!(config.transfer_config.max_concurrency, 10);
        assert_eq!(config.max_workers, 20);
        assert_eq!(config.max_pool_connections, 50);
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--multipart-threshold",
            "50MiB",
            "--multipart-chunksize",
            "20MiB",
            "--max-concurrency",
            "4",
            "--max-workers",
            "64",
            "--max-pool-connections",
            "128",
        ];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(config.transfer_config.multipart_threshold, 50 * 1024 * 1024);
        assert_eq!(config.transfer_config.multipart_chunksize, 20 * 1024 * 1024);
        assert_eq!(config.transfer_config.max_concurrency, 4);
        assert_eq!(config.max_workers, 64);
        assert_eq!(config.max_pool_connections, 128);
    }

    #[test]
    fn with_error() {
        init_dummy_tracing_subscriber();

        for args in [
            vec!["s3mirror", "--multipart-threshold", "4MiB"],
            vec!["s3mirror", "--multipart-chunksize", "6GiB"],
            vec!["s3mirror", "--max-workers", "0"],
            vec!["s3mirror", "--max-concurrency", "0"],
            vec!["s3mirror", "--max-pool-connections", "0"],
        ] {
            assert!(parse_from_args(args).is_err());
        }
    }

    #[test]
    fn chunksize_over_threshold() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "--multipart-threshold",
            "8MiB",
            "--multipart-chunksize",
            "16MiB",
        ];

        let result = build_config_from_args(args);

        assert_eq!(
            result.unwrap_err(),
            MULTIPART_CHUNKSIZE_OVER_THRESHOLD.to_string()
        );
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

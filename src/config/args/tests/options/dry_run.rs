#[cfg(test)]
mod tests {
    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "--bucket", "bucket1"];

        let config = build_config_from_args(args).unwrap();

        assert!(!config.dry_run);
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Warn
        );
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "--bucket", "bucket1", "--dry-run"];

        let config = build_config_from_args(args).unwrap();
        let tracing_config = config.tracing_config.as_ref().unwrap();

        assert!(config.dry_run);
        assert_eq!(tracing_config.tracing_level, log::Level::Info);
        assert!(!tracing_config.json_tracing);
        assert!(!tracing_config.aws_sdk_tracing);
        assert!(!tracing_config.span_events_tracing);
        assert!(!tracing_config.disable_color_tracing);
    }

    #[test]
    fn with_custom_value_with_tracing_option() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "--dry-run", "-vv", "--json-tracing"];

        let config = build_config_from_args(args).unwrap();
        let tracing_config = config.tracing_config.as_ref().unwrap();

        assert_eq!(tracing_config.tracing_level, log::Level::Debug);
        assert!(tracing_config.json_tracing);
    }

    #[test]
    fn with_quiet_option() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "--dry-run", "-qq"];

        let config = build_config_from_args(args).unwrap();

        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Info
        );
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

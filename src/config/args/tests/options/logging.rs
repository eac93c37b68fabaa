#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::args::*;

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror"];

        let config = build_config_from_args(args).unwrap();
        let tracing_config = config.tracing_config.as_ref().unwrap();

        assert_eq!(tracing_config.tracing_level, log::Level::Warn);
        assert!(!tracing_config.json_tracing);
        assert!(!tracing_config.aws_sdk_tracing);
        assert!(!tracing_config.span_events_tracing);
        assert!(!tracing_config.disable_color_tracing);
        assert!(tracing_config.log_file.is_none());
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "s3mirror",
            "-vvv",
            "--json-tracing",
            "--aws-sdk-tracing",
            "--span-events-tracing",
            "--disable-color-tracing",
            "--log-file",
            "./s3mirror.log",
        ];

        let config = build_config_from_args(args).unwrap();
        let tracing_config = config.tracing_config.as_ref().unwrap();

        assert_eq!(tracing_config.tracing_level, log::Level::Trace);
        assert!(tracing_config.json_tracing);
        assert!(tracing_config.aws_sdk_tracing);
        assert!(tracing_config.span_events_tracing);
        assert!(tracing_config.disable_color_tracing);
        assert_eq!(
            tracing_config.log_file,
            Some(PathBuf::from("./s3mirror.log"))
        );
    }

    #[test]
    fn with_quiet() {
        init_dummy_tracing_subscriber();

        let args = vec!["s3mirror", "-q"];
        let config = build_config_from_args(args).unwrap();
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Error
        );

        let args = vec!["s3mirror", "-qq"];
        let config = build_config_from_args(args).unwrap();
        assert!(config.tracing_config.is_none());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

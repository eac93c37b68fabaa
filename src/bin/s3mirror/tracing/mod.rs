use std::env;
use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusty_fork::rusty_fork_test;
use tracing_subscriber::fmt::format::FmtSpan;

use s3mirror::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber_builder = tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_ansi(!config.disable_color_tracing && config.log_file.is_none())
        .with_span_events(fmt_span);

    let mut show_target = true;
    let tracing_level = config.tracing_level;
    let event_filter = if config.aws_sdk_tracing {
        format!(
            "s3mirror={tracing_level},aws_smithy_runtime={tracing_level},aws_config={tracing_level},aws_sigv4={tracing_level}"
        )
    } else if let Ok(env_filter) = env::var(EVENT_FILTER_ENV_VAR) {
        env_filter
    } else {
        show_target = false;
        format!("s3mirror={tracing_level}")
    };

    let subscriber_builder = subscriber_builder
        .with_env_filter(event_filter)
        .with_target(show_target);

    let Some(log_file) = config.log_file.as_ref() else {
        if config.json_tracing {
            subscriber_builder.json().init();
        } else {
            subscriber_builder.init();
        }
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file: {}", log_file.display()))?;

    let subscriber_builder = subscriber_builder.with_writer(Mutex::new(file));
    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }

    Ok(())
}

rusty_fork_test! {
    #[test]
    fn init_json_tracing() {
        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: true,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
            log_file: None,
        }).unwrap();
    }

    #[test]
    fn init_aws_sdk_tracing() {
        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: true,
            span_events_tracing: false,
            disable_color_tracing: false,
            log_file: None,
        }).unwrap();
    }

    #[test]
    fn init_normal_tracing() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::remove_var(EVENT_FILTER_ENV_VAR) };

        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
            log_file: None,
        }).unwrap();
    }

    #[test]
    fn init_span_events_tracing() {
        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: true,
            span_events_tracing: true,
            disable_color_tracing: false,
            log_file: None,
        }).unwrap();
    }

    #[test]
    fn init_disable_color_tracing() {
        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: true,
            log_file: None,
        }).unwrap();
    }

    #[test]
    fn init_with_env() {
        // This code is used to test purpose only and run separated processes.
        unsafe { env::set_var(EVENT_FILTER_ENV_VAR, "trace") };

        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: true,
            log_file: None,
        }).unwrap();
    }

    #[test]
    fn init_log_file_tracing() {
        let log_file = env::temp_dir().join(format!("s3mirror-tracing-{}.log", std::process::id()));

        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
            log_file: Some(log_file.clone()),
        }).unwrap();
        tracing::info!("written to the log file.");

        assert!(log_file.exists());
        let _ = std::fs::remove_file(log_file);
    }

    #[test]
    fn init_log_file_tracing_invalid_path() {
        let result = init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
            log_file: Some("/nonexistent-dir-s3mirror/s3mirror.log".into()),
        });

        assert!(result.is_err());
    }
}

use s3mirror::Config;

/// The live progress line competes with log events on the terminal, so it is only drawn when
/// events are quiet and go to stdout as text.
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return true;
    };

    if tracing_config.log_file.is_some() {
        return !tracing_config.json_tracing;
    }

    if log::Level::Warn < tracing_config.tracing_level {
        return false;
    }

    !tracing_config.json_tracing
}

pub fn is_show_result_needed(config: &Config) -> bool {
    match config.tracing_config.as_ref() {
        None => true,
        Some(tracing_config) => !tracing_config.json_tracing,
    }
}

use anyhow::Result;
use chrono::Local;
use tokio::time::Instant;
use tracing::{error, trace, warn};

use s3mirror::Config;
use s3mirror::pipeline::Pipeline;
use s3mirror::types::RunReport;
use s3mirror::types::token::create_pipeline_cancellation_token;

mod ctrl_c_handler;
mod indicator;
mod summary;
mod ui_config;

pub const EXIT_CODE_SUCCESS: i32 = 0;
pub const EXIT_CODE_ERROR: i32 = 1;
pub const EXIT_CODE_INVALID_ARGS: i32 = 2;
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Runs every selected bucket and returns the process exit code.
pub async fn run(config: Config) -> Result<i32> {
    let cancellation_token = create_pipeline_cancellation_token();

    let ctrl_c_join_handle = ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = Instant::now();
    let started_at = Local::now();
    trace!("mirror pipeline start.");

    let mut pipeline = Pipeline::new(config.clone(), cancellation_token).await;
    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        config.dry_run,
    );

    let run_report = pipeline.run().await;
    let progress_totals = indicator_join_handle.await?;
    ctrl_c_join_handle.abort();

    let elapsed = start_time.elapsed();
    let run_summary = summary::RunSummary {
        run_report: &run_report,
        progress_totals,
        started_at,
        finished_at: Local::now(),
        elapsed,
        has_error: pipeline.has_error(),
    };

    run_summary.log();
    if ui_config::is_show_result_needed(&config) {
        println!("{}", run_summary.format());
    }

    let exit_code = exit_code(&run_report, pipeline.has_error());
    let duration_sec = format!("{:.3}", elapsed.as_secs_f32());
    match exit_code {
        EXIT_CODE_CANCELLED => {
            warn!(duration_sec = duration_sec, "s3mirror has been cancelled.");
        }
        EXIT_CODE_ERROR => {
            error!(duration_sec = duration_sec, "s3mirror failed.");
        }
        _ => {
            trace!(duration_sec = duration_sec, "s3mirror has been completed.");
        }
    }

    Ok(exit_code)
}

fn exit_code(run_report: &RunReport, has_error: bool) -> i32 {
    if run_report.cancelled {
        EXIT_CODE_CANCELLED
    } else if has_error || run_report.has_failure() {
        EXIT_CODE_ERROR
    } else {
        EXIT_CODE_SUCCESS
    }
}

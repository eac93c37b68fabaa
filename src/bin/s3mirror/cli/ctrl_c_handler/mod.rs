use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use s3mirror::types::token::PipelineCancellationToken;

use super::EXIT_CODE_CANCELLED;

/// The first ctrl-c cancels the run and lets in-flight actions wind down so a partial report
/// can be printed. A second ctrl-c exits immediately.
pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    spawn_ctrl_c_handler_with(cancellation_token, || std::process::exit(EXIT_CODE_CANCELLED))
}

fn spawn_ctrl_c_handler_with<F>(
    cancellation_token: PipelineCancellationToken,
    force_exit: F,
) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("run finished before ctrl-c.");
                return;
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("failed to listen for ctrl-c signal: {e}");
                    return;
                }
                warn!("ctrl-c received, waiting for in-flight actions. press ctrl-c again to exit now.");
                cancellation_token.cancel();
            }
        }

        if signal::ctrl_c().await.is_ok() {
            warn!("second ctrl-c received, exiting.");
            force_exit();
        }
    })
}

/// Held by every test that delivers SIGINT to the process or installs a handler for it.
#[cfg(test)]
pub(super) static SIGNAL_TEST_SEMAPHORE: once_cell::sync::Lazy<tokio::sync::Semaphore> =
    once_cell::sync::Lazy::new(|| tokio::sync::Semaphore::new(1));

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use s3mirror::types::token;

    use super::*;

    const WAITING_TIME_MILLIS_FOR_ASYNC_CTRL_C_HANDLER_START: u64 = 100;

    #[tokio::test]
    #[cfg(target_family = "unix")]
    async fn first_sigint_cancels_the_run() {
        init_dummy_tracing_subscriber();

        let _semaphore = SIGNAL_TEST_SEMAPHORE.acquire().await.unwrap();

        let cancellation_token = token::create_pipeline_cancellation_token();
        let forced = Arc::new(AtomicBool::new(false));
        let forced_clone = forced.clone();

        let join_handle = spawn_ctrl_c_handler_with(cancellation_token.clone(), move || {
            forced_clone.store(true, Ordering::SeqCst)
        });
        tokio::time::sleep(Duration::from_millis(
            WAITING_TIME_MILLIS_FOR_ASYNC_CTRL_C_HANDLER_START,
        ))
        .await;

        kill_sigint_to_self();
        tokio::time::timeout(Duration::from_secs(5), cancellation_token.cancelled())
            .await
            .unwrap();

        assert!(cancellation_token.is_cancelled());
        assert!(!forced.load(Ordering::SeqCst));

        join_handle.abort();
    }

    #[tokio::test]
    #[cfg(target_family = "unix")]
    async fn second_sigint_forces_exit() {
        init_dummy_tracing_subscriber();

        let _semaphore = SIGNAL_TEST_SEMAPHORE.acquire().await.unwrap();

        let cancellation_token = token::create_pipeline_cancellation_token();
        let forced = Arc::new(AtomicBool::new(false));
        let forced_clone = forced.clone();

        let join_handle = spawn_ctrl_c_handler_with(cancellation_token.clone(), move || {
            forced_clone.store(true, Ordering::SeqCst)
        });
        tokio::time::sleep(Duration::from_millis(
            WAITING_TIME_MILLIS_FOR_ASYNC_CTRL_C_HANDLER_START,
        ))
        .await;

        kill_sigint_to_self();
        tokio::time::timeout(Duration::from_secs(5), cancellation_token.cancelled())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(
            WAITING_TIME_MILLIS_FOR_ASYNC_CTRL_C_HANDLER_START,
        ))
        .await;

        kill_sigint_to_self();
        tokio::time::timeout(Duration::from_secs(5), join_handle)
            .await
            .unwrap()
            .unwrap();

        assert!(forced.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handler_stops_when_the_run_finishes() {
        init_dummy_tracing_subscriber();

        let _semaphore = SIGNAL_TEST_SEMAPHORE.acquire().await.unwrap();

        let cancellation_token = token::create_pipeline_cancellation_token();

        let join_handle = spawn_ctrl_c_handler_with(cancellation_token.clone(), || {
            panic!("must not be called")
        });
        cancellation_token.cancel();

        join_handle.await.unwrap();

        assert!(cancellation_token.is_cancelled());
    }

    #[cfg(target_family = "unix")]
    fn kill_sigint_to_self() {
        nix::sys::signal::kill(nix::unistd::Pid::this(), nix::sys::signal::Signal::SIGINT).unwrap();
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

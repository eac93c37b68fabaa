use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use s3mirror::types::SyncStatistics;

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;
const POLL_INTERVAL_SECS: f32 = 0.05;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTotals {
    pub copied: u64,
    pub transferred_bytes: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub retried: u64,
    pub e_tag_verified: u64,
}

impl ProgressTotals {
    fn add(&mut self, sync_stats: &SyncStatistics) {
        match sync_stats {
            SyncStatistics::SyncComplete { .. } => self.copied += 1,
            SyncStatistics::SyncBytes(size) => self.transferred_bytes += size,
            SyncStatistics::SyncDelete { .. } => self.deleted += 1,
            SyncStatistics::SyncSkip { .. } => self.skipped += 1,
            SyncStatistics::SyncError { .. } => self.failed += 1,
            SyncStatistics::SyncWarning { .. } => self.retried += 1,
            SyncStatistics::ETagVerified { .. } => self.e_tag_verified += 1,
        }
    }
}

/// Drains the statistics channel until the pipeline closes it and returns what it counted.
/// Transferred bytes arrive per part, so the byte rate moves during a large multipart copy.
pub fn show_indicator(
    stats_receiver: Receiver<SyncStatistics>,
    show_progress: bool,
    dry_run: bool,
) -> JoinHandle<ProgressTotals> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let mut ma_synced_bytes = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut ma_synced_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();

        let mut totals = ProgressTotals::default();

        loop {
            let before = totals;

            let period = Instant::now();
            loop {
                while let Ok(sync_stats) = stats_receiver.try_recv() {
                    totals.add(&sync_stats);
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    progress_text.finish_and_clear();
                    return totals;
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(POLL_INTERVAL_SECS)).await;
            }

            ma_synced_bytes.add_sample(totals.transferred_bytes - before.transferred_bytes);
            if !dry_run {
                ma_synced_count.add_sample(totals.copied - before.copied);
            }

            if show_progress {
                progress_text.set_message(format!(
                    "{:>3} | {:>3}/sec,  copied {:>3} objects | {:>3} objects/sec,  deleted {} objects,  skipped {} objects,  failed {} objects,  retried {} times",
                    HumanBytes(totals.transferred_bytes),
                    HumanBytes(ma_synced_bytes.get_average()).to_string(),
                    totals.copied,
                    HumanCount(ma_synced_count.get_average()).to_string(),
                    totals.deleted,
                    totals.skipped,
                    totals.failed,
                    totals.retried,
                ));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const WAITING_TIME_MILLIS_FOR_ASYNC_INDICATOR_SET_MESSAGE: u64 = 1500;

    async fn send_all(stats_sender: &async_channel::Sender<SyncStatistics>) {
        for sync_stats in [
            SyncStatistics::SyncBytes(1),
            SyncStatistics::SyncBytes(2),
            SyncStatistics::SyncComplete {
                key: "test".to_string(),
            },
            SyncStatistics::SyncSkip {
                key: "test".to_string(),
            },
            SyncStatistics::SyncWarning {
                key: "test".to_string(),
            },
            SyncStatistics::SyncError {
                key: "test".to_string(),
            },
            SyncStatistics::SyncDelete {
                key: "test".to_string(),
            },
            SyncStatistics::ETagVerified {
                key: "test".to_string(),
            },
        ] {
            stats_sender.send(sync_stats).await.unwrap();
        }
    }

    fn expected_totals() -> ProgressTotals {
        ProgressTotals {
            copied: 1,
            transferred_bytes: 3,
            deleted: 1,
            skipped: 1,
            failed: 1,
            retried: 1,
            e_tag_verified: 1,
        }
    }

    #[tokio::test]
    async fn indicator_counts_with_progress() {
        init_dummy_tracing_subscriber();

        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let join_handle = show_indicator(stats_receiver, true, false);

        send_all(&stats_sender).await;

        tokio::time::sleep(Duration::from_millis(
            WAITING_TIME_MILLIS_FOR_ASYNC_INDICATOR_SET_MESSAGE,
        ))
        .await;
        stats_sender.close();

        assert_eq!(join_handle.await.unwrap(), expected_totals());
    }

    #[tokio::test]
    async fn indicator_counts_without_progress() {
        init_dummy_tracing_subscriber();

        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let join_handle = show_indicator(stats_receiver, false, false);

        send_all(&stats_sender).await;
        stats_sender.close();

        assert_eq!(join_handle.await.unwrap(), expected_totals());
    }

    #[tokio::test]
    async fn indicator_counts_dry_run() {
        init_dummy_tracing_subscriber();

        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let join_handle = show_indicator(stats_receiver, true, true);

        send_all(&stats_sender).await;

        tokio::time::sleep(Duration::from_millis(
            WAITING_TIME_MILLIS_FOR_ASYNC_INDICATOR_SET_MESSAGE,
        ))
        .await;
        stats_sender.close();

        assert_eq!(join_handle.await.unwrap(), expected_totals());
    }

    #[tokio::test]
    async fn indicator_finishes_on_closed_channel() {
        init_dummy_tracing_subscriber();

        let (stats_sender, stats_receiver) = async_channel::unbounded::<SyncStatistics>();
        stats_sender.close();

        let totals = show_indicator(stats_receiver, true, false).await.unwrap();

        assert_eq!(totals, ProgressTotals::default());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

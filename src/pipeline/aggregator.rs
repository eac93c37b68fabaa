use async_channel::{Receiver, Sender};
use tracing::{debug, info, trace};

use crate::types::SyncStatistics::{SyncComplete, SyncDelete, SyncError, SyncSkip};
use crate::types::{ActionKind, ActionOutcome, SyncReport, SyncStatistics, TransferResult};

/// Sole writer of a bucket's [`SyncReport`]. Workers only send it [`ActionOutcome`]s.
pub struct ReportAggregator {
    receiver: Receiver<ActionOutcome>,
    stats_sender: Sender<SyncStatistics>,
    report: SyncReport,
}

impl ReportAggregator {
    pub fn new(
        bucket: &str,
        receiver: Receiver<ActionOutcome>,
        stats_sender: Sender<SyncStatistics>,
    ) -> Self {
        Self {
            receiver,
            stats_sender,
            report: SyncReport::new(bucket),
        }
    }

    /// Runs until every sender has been dropped, then hands the report back.
    pub async fn aggregate(mut self) -> SyncReport {
        trace!(bucket = self.report.bucket, "report aggregator has started.");

        while let Ok(outcome) = self.receiver.recv().await {
            self.emit(&outcome).await;
            self.report.record(outcome);
        }

        trace!(
            bucket = self.report.bucket,
            processed = self.report.processed(),
            "report aggregator has been completed."
        );

        self.report
    }

    async fn emit(&self, outcome: &ActionOutcome) {
        let bucket = self.report.bucket.as_str();
        let key = outcome.key.clone();

        let stats = match (&outcome.result, outcome.kind) {
            (TransferResult::Succeeded, ActionKind::CopyNew | ActionKind::CopyChanged) => {
                info!(
                    bucket = bucket,
                    key = outcome.key,
                    action = %outcome.kind,
                    size = outcome.bytes,
                    "sync completed."
                );
                SyncComplete { key }
            }
            (TransferResult::Succeeded, ActionKind::DeleteExtraneous) => {
                info!(
                    bucket = bucket,
                    key = outcome.key,
                    action = %outcome.kind,
                    "delete completed."
                );
                SyncDelete { key }
            }
            (TransferResult::Succeeded, ActionKind::Skip)
            | (TransferResult::SkippedByPolicy, _) => {
                debug!(bucket = bucket, key = outcome.key, "object skipped.");
                SyncSkip { key }
            }
            (TransferResult::Failed { .. }, _) => SyncError { key },
        };

        let _ = self.stats_sender.send(stats).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;

    #[tokio::test]
    async fn aggregate_outcomes() {
        init_dummy_tracing_subscriber();

        let (sender, receiver) = async_channel::unbounded();
        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let aggregator = ReportAggregator::new("bucket1", receiver, stats_sender);
        let handle = tokio::spawn(aggregator.aggregate());

        for outcome in [
            ActionOutcome::new("a", ActionKind::CopyNew, TransferResult::Succeeded, 10),
            ActionOutcome::new("b", ActionKind::CopyChanged, TransferResult::Succeeded, 5),
            ActionOutcome::new("c", ActionKind::Skip, TransferResult::SkippedByPolicy, 0),
            ActionOutcome::new("d", ActionKind::DeleteExtraneous, TransferResult::Succeeded, 0),
            ActionOutcome::new(
                "e",
                ActionKind::CopyNew,
                TransferResult::Failed {
                    kind: FailureKind::Permanent,
                    message: "AccessDenied".to_string(),
                },
                0,
            ),
        ] {
            sender.send(outcome).await.unwrap();
        }
        drop(sender);

        let report = handle.await.unwrap();

        assert_eq!(report.bucket, "bucket1");
        assert_eq!(report.copied, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.bytes_transferred, 15);
        assert_eq!(report.processed(), 5);
        assert_eq!(report.failures[0].key, "e");
        assert_eq!(report.failures[0].kind, FailureKind::Permanent);

        assert_eq!(stats_receiver.len(), 5);
        assert_eq!(
            stats_receiver.recv().await.unwrap(),
            SyncComplete {
                key: "a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn aggregate_from_many_senders() {
        init_dummy_tracing_subscriber();

        let (sender, receiver) = async_channel::bounded(4);
        let (stats_sender, _stats_receiver) = async_channel::unbounded();
        let handle =
            tokio::spawn(ReportAggregator::new("bucket1", receiver, stats_sender).aggregate());

        let mut senders = vec![];
        for worker_index in 0..8 {
            let sender = sender.clone();
            senders.push(tokio::spawn(async move {
                for i in 0..100 {
                    sender
                        .send(ActionOutcome::new(
                            format!("{worker_index}/{i}"),
                            ActionKind::CopyNew,
                            TransferResult::Succeeded,
                            1,
                        ))
                        .await
                        .unwrap();
                }
            }));
        }
        drop(sender);
        for handle in senders {
            handle.await.unwrap();
        }

        let report = handle.await.unwrap();

        assert_eq!(report.copied, 800);
        assert_eq!(report.bytes_transferred, 800);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

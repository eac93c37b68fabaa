use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Config;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{Action, ActionOutcome, SyncStatistics};

/// Everything one executor worker needs for a single bucket.
pub struct Stage {
    pub config: Config,
    pub bucket: String,
    pub source: Storage,
    pub target: Storage,
    pub receiver: Receiver<Action>,
    pub sender: Sender<ActionOutcome>,
    pub cancellation_token: PipelineCancellationToken,
    pub stats_sender: Sender<SyncStatistics>,
    pub has_warning: Arc<AtomicBool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

impl Stage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        bucket: &str,
        source: Storage,
        target: Storage,
        receiver: Receiver<Action>,
        sender: Sender<ActionOutcome>,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<SyncStatistics>,
        has_warning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            bucket: bucket.to_string(),
            source,
            target,
            receiver,
            sender,
            cancellation_token,
            stats_sender,
            has_warning,
        }
    }

    pub async fn send(&self, outcome: ActionOutcome) -> Result<SendResult> {
        let result = self
            .sender
            .send(outcome)
            .await
            .context("async_channel::Sender::send() failed.");

        if let Err(e) = result {
            return if !self.is_channel_closed() {
                Err(anyhow!(e))
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    pub fn is_channel_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn send_stats(&self, stats: SyncStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }

    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }
}

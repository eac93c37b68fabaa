use std::time::Duration;

use anyhow::Error;

use crate::types::FailureKind;
use crate::types::error::{is_cancelled_error, is_transient_error};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Lifecycle of one action. Attempt numbers start at 1.
///
/// `Pending -> Attempting(1) -> {Succeeded | Retrying(2) -> Attempting(2) ... | Failed*}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Attempting(u32),
    Retrying(u32),
    Succeeded,
    FailedPermanent,
    FailedExhausted,
    FailedCancelled,
}

/// What happened to the last attempt, or to the backoff wait before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Start,
    Success,
    Transient,
    Permanent,
    Cancelled,
}

impl AttemptState {
    pub fn next(self, outcome: AttemptOutcome, max_attempts: u32) -> AttemptState {
        match (self, outcome) {
            (AttemptState::Pending, AttemptOutcome::Start) => AttemptState::Attempting(1),
            (AttemptState::Retrying(n), AttemptOutcome::Start) => AttemptState::Attempting(n),
            (AttemptState::Attempting(_), AttemptOutcome::Success) => AttemptState::Succeeded,
            (AttemptState::Attempting(n), AttemptOutcome::Transient) if n < max_attempts => {
                AttemptState::Retrying(n + 1)
            }
            (AttemptState::Attempting(_), AttemptOutcome::Transient) => {
                AttemptState::FailedExhausted
            }
            (AttemptState::Attempting(_), AttemptOutcome::Permanent) => {
                AttemptState::FailedPermanent
            }
            (state, AttemptOutcome::Cancelled) if !state.is_terminal() => {
                AttemptState::FailedCancelled
            }
            (state, _) => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded
                | AttemptState::FailedPermanent
                | AttemptState::FailedExhausted
                | AttemptState::FailedCancelled
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttemptState::FailedPermanent => Some(FailureKind::Permanent),
            AttemptState::FailedExhausted => Some(FailureKind::TransientExhausted),
            AttemptState::FailedCancelled => Some(FailureKind::Cancelled),
            _ => None,
        }
    }
}

pub fn classify_error(e: &Error) -> AttemptOutcome {
    if is_cancelled_error(e) {
        AttemptOutcome::Cancelled
    } else if is_transient_error(e) {
        AttemptOutcome::Transient
    } else {
        AttemptOutcome::Permanent
    }
}

/// Delay before retry attempt `attempt` (2 or later): `base * 2^(attempt - 2)`, capped at 30s.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2).min(31);
    base.saturating_mul(1 << exponent).min(MAX_BACKOFF)
}

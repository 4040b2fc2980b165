use std::time::Duration;

use crate::draft::RequestDraft;
use crate::error::CourierError;
use crate::transport::TransportError;

pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_millis(1000);

pub enum RetryDecision {
    Wait(Duration),
    GiveUp(CourierError),
}

/// Decides, after a failed send, whether to try again.
///
/// `attempt` is the zero-based index of the send that just failed.
pub trait Retryer: Send + Sync {
    fn should_retry(&self, attempt: u32, error: TransportError) -> RetryDecision;
}

/// Exponential backoff: waits `2^attempt * unit`, capped by the max
/// retry interval when one is set.
#[derive(Clone, Debug)]
pub struct BackoffRetryer {
    max_retry_count: u32,
    max_retry_interval: Option<Duration>,
    unit: Duration,
}

impl BackoffRetryer {
    pub fn new(max_retry_count: u32, max_retry_interval: Option<Duration>) -> Self {
        Self {
            max_retry_count,
            max_retry_interval,
            unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    pub fn for_draft(draft: &RequestDraft) -> Self {
        Self::new(draft.retry_count(), draft.max_retry_interval())
    }

    #[inline]
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    #[inline]
    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    pub fn next_interval(&self, attempt: u32) -> Duration {
        let wait = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.unit.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        match self.max_retry_interval {
            Some(max) => wait.min(max),
            None => wait,
        }
    }
}

impl Retryer for BackoffRetryer {
    fn should_retry(&self, attempt: u32, error: TransportError) -> RetryDecision {
        if attempt >= self.max_retry_count {
            return RetryDecision::GiveUp(if attempt == 0 {
                CourierError::Transport(error)
            } else {
                CourierError::RetryExhausted {
                    attempts: attempt + 1,
                    source: error,
                }
            });
        }
        RetryDecision::Wait(self.next_interval(attempt))
    }
}

/// Per-call retry bookkeeping.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub waited: Duration,
}

impl RetryState {
    pub fn record(&mut self, wait: Duration) {
        self.attempt += 1;
        self.waited = self.waited.saturating_add(wait);
    }
}

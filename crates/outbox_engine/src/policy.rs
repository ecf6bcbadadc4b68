//! Per-mutation transition policy.
//!
//! Given the outcome of one dispatch, decides what happens to the mutation.
//! Pure: no queue access and no notifications, so the retry rules can be
//! tested on their own.

use crate::config::RetryConfig;
use crate::dispatcher::DispatchOutcome;
use crate::error::DispatchError;

/// Why a mutation was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The retry budget is used up.
    BudgetExhausted,
    /// The mutation can never succeed.
    NonRetryable,
}

/// What to do with a mutation after one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Applied; remove it and invalidate the entity.
    Complete,
    /// Failed; mark failed and try again next drain.
    Retry {
        /// New retry count.
        retry_count: u32,
        /// Error message to record.
        error: String,
    },
    /// Failed for good; remove it and report it.
    Evict {
        /// Retry count at eviction.
        retry_count: u32,
        /// Error message to record.
        error: String,
        /// Why the mutation is evicted.
        reason: EvictionReason,
    },
}

impl Transition {
    /// Returns true for [`Transition::Complete`].
    pub fn is_complete(&self) -> bool {
        matches!(self, Transition::Complete)
    }

    /// Returns true for [`Transition::Evict`].
    pub fn is_evict(&self) -> bool {
        matches!(self, Transition::Evict { .. })
    }
}

/// Decides the transition for a mutation that had `retry_count` failures
/// before this dispatch.
///
/// Non-retryable failures leave the retry count untouched.
pub fn decide(
    retry_count: u32,
    result: &Result<DispatchOutcome, DispatchError>,
    retry: &RetryConfig,
) -> Transition {
    let error = match result {
        Ok(_) => return Transition::Complete,
        Err(error) => error,
    };

    if !error.is_retryable() {
        return Transition::Evict {
            retry_count,
            error: error.to_string(),
            reason: EvictionReason::NonRetryable,
        };
    }

    let retry_count = retry_count.saturating_add(1);
    if retry.is_exhausted(retry_count) {
        Transition::Evict {
            retry_count,
            error: error.to_string(),
            reason: EvictionReason::BudgetExhausted,
        }
    } else {
        Transition::Retry {
            retry_count,
            error: error.to_string(),
        }
    }
}

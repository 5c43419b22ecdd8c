//! Retry scheduling for failed dispatch attempts.

// self
use crate::{_prelude::*, dispatch::DispatchErrorKind};

/// Retry schedule consulted by [`decide`]; owned by the dispatcher and shared across workers.
#[derive(Clone, Debug)]
pub struct RetrySchedule {
	/// Maximum number of retries after the first failed attempt.
	pub max_retry_count: u32,
	/// Backoff delay indexed by the task's `retry_count` at failure time.
	pub delays: Vec<Duration>,
}

/// Decision produced after a failed delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Re-enqueue the task after sleeping `delay`.
	Retry {
		/// Backoff before the next attempt is issued.
		delay: Duration,
	},
	/// The task is terminal; no further attempts.
	GiveUp,
}

/// Decide whether a task that failed at `retry_count` with `error` should be retried.
///
/// `DisallowedScheme` and `PayloadTooLarge` are terminal on the first attempt; every
/// other kind is retried until `schedule.max_retry_count` attempts have been made.
pub fn decide(retry_count: u32, error: DispatchErrorKind, schedule: &RetrySchedule) -> RetryDecision {
	if !error.is_retryable() || retry_count >= schedule.max_retry_count {
		return RetryDecision::GiveUp;
	}

	match schedule.delays.get(retry_count as usize) {
		Some(delay) => RetryDecision::Retry { delay: *delay },
		None => RetryDecision::GiveUp,
	}
}

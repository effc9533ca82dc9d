//! Bounded retry combinators used to acquire sessions.
//!
//! Session creation composes two levels: [`Backoff`] retries a single creation
//! call on transient failures with doubling delays, and [`LinearRetry`] wraps
//! whole acquisition attempts, sleeping `delay * attempt` between them.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Exponential backoff restricted to failures a predicate marks as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
	/// Total tries including the first one.
	pub max_tries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl Default for Backoff {
	fn default() -> Self {
		Self {
			max_tries: 3,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
		}
	}
}

impl Backoff {
	/// Delay slept after the `attempt`-th failed try (1-based).
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}

	/// Runs `op` until it succeeds, fails with a non-transient error, or
	/// `max_tries` is exhausted. The last error is returned unchanged.
	pub async fn retry<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		P: Fn(&E) -> bool,
		E: Display,
	{
		let max_tries = self.max_tries.max(1);
		let mut attempt = 1;
		loop {
			match op().await {
				Ok(value) => return Ok(value),
				Err(err) if attempt < max_tries && is_transient(&err) => {
					let delay = self.delay_for(attempt);
					debug!(
						target = "verifyd.retry",
						attempt,
						max_tries,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"transient failure; backing off"
					);
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}
}

/// Outer retry loop with linearly growing pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRetry {
	pub max_attempts: u32,
	pub delay: Duration,
}

impl LinearRetry {
	/// Runs `op` (given the 1-based attempt number) up to `max_attempts` times.
	pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Display,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			match op(attempt).await {
				Ok(value) => return Ok(value),
				Err(err) if attempt < max_attempts => {
					let pause = self.delay.saturating_mul(attempt);
					warn!(
						target = "verifyd.retry",
						attempt,
						max_attempts,
						pause_ms = pause.as_millis() as u64,
						error = %err,
						"attempt failed; retrying"
					);
					tokio::time::sleep(pause).await;
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}
}

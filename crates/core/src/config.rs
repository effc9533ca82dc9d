//! Tunables for the session lifecycle manager and the job registry.
//!
//! Every setting is a plain scalar; the binary fills these from CLI flags and
//! tests shrink the intervals to keep clock-driven scenarios fast.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{Backoff, LinearRetry};

/// Settings for one [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
	/// Inactivity after which the idle monitor stops the session.
	pub idle_timeout: Duration,
	/// Outer creation attempts.
	pub max_retries: u32,
	/// Base of the linear delay between outer attempts (`retry_delay * attempt`).
	pub retry_delay: Duration,
	/// Inner exponential backoff wrapped around each creation call.
	pub creation_backoff: Backoff,
	/// How long the processing loop waits on an empty queue before rechecking the run flag.
	pub job_poll_interval: Duration,
	/// Wake-up period of the idle monitor.
	pub idle_poll_interval: Duration,
	/// Upper bound on waiting for each background loop during `stop()`.
	pub join_timeout: Duration,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			idle_timeout: Duration::from_secs(300),
			max_retries: 3,
			retry_delay: Duration::from_secs(5),
			creation_backoff: Backoff::default(),
			job_poll_interval: Duration::from_secs(1),
			idle_poll_interval: Duration::from_secs(10),
			join_timeout: Duration::from_secs(5),
		}
	}
}

impl ManagerConfig {
	/// Outer retry loop derived from `max_retries` and `retry_delay`.
	pub fn creation_retry(&self) -> LinearRetry {
		LinearRetry {
			max_attempts: self.max_retries,
			delay: self.retry_delay,
		}
	}
}

/// Settings for the [`ServiceRegistry`](crate::ServiceRegistry) sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
	pub sweep_interval: Duration,
	/// Jobs submitted longer ago than this are dropped by the sweep.
	pub max_age: Duration,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			sweep_interval: Duration::from_secs(300),
			max_age: Duration::from_secs(3600),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let config = ManagerConfig::default();
		assert_eq!(config.idle_timeout, Duration::from_secs(300));
		assert_eq!(config.max_retries, 3);
		assert_eq!(config.creation_backoff.max_tries, 3);
		assert_eq!(config.idle_poll_interval, Duration::from_secs(10));

		let registry = RegistryConfig::default();
		assert_eq!(registry.sweep_interval, Duration::from_secs(300));
		assert_eq!(registry.max_age, Duration::from_secs(3600));
	}

	#[test]
	fn partial_json_falls_back_to_defaults() {
		let config: ManagerConfig = serde_json::from_str(r#"{"max_retries": 5, "idle_timeout": {"secs": 60, "nanos": 0}}"#).unwrap();
		assert_eq!(config.idle_timeout, Duration::from_secs(60));
		assert_eq!(config.max_retries, 5);
		assert_eq!(config.retry_delay, Duration::from_secs(5));
		assert_eq!(config.creation_retry().max_attempts, 5);
	}
}

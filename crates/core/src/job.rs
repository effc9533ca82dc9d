//! Job records tracked by a [`JobQueue`](crate::JobQueue).

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque correlation token handed back to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl FromStr for JobId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	Pending,
	Completed,
}

/// Result attached to a job when it completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutcome {
	Available { identifier: String, available: bool, completed_at: u64 },
	Failed { identifier: String, error: String, completed_at: u64 },
}

impl JobOutcome {
	pub fn available(identifier: impl Into<String>, available: bool) -> Self {
		Self::Available {
			identifier: identifier.into(),
			available,
			completed_at: now_ts(),
		}
	}

	pub fn failed(identifier: impl Into<String>, error: impl Into<String>) -> Self {
		Self::Failed {
			identifier: identifier.into(),
			error: error.into(),
			completed_at: now_ts(),
		}
	}

	pub fn is_failure(&self) -> bool {
		matches!(self, Self::Failed { .. })
	}
}

/// One verification request and its lifecycle state.
///
/// `status` and `result` only change together, through [`Job::complete`], so a
/// snapshot never shows a result without `Completed` or the reverse.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
	pub id: JobId,
	pub payload: String,
	#[serde(skip)]
	pub submitted_at: Instant,
	#[serde(rename = "submitted_at")]
	pub submitted_ts: u64,
	status: JobStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<JobOutcome>,
}

impl Job {
	pub(crate) fn pending(payload: String) -> Self {
		Self {
			id: JobId::new(),
			payload,
			submitted_at: Instant::now(),
			submitted_ts: now_ts(),
			status: JobStatus::Pending,
			result: None,
		}
	}

	pub fn status(&self) -> JobStatus {
		self.status
	}

	pub fn result(&self) -> Option<&JobOutcome> {
		self.result.as_ref()
	}

	pub fn is_pending(&self) -> bool {
		self.status == JobStatus::Pending
	}

	/// Transitions Pending to Completed. Returns `false` if already completed.
	pub(crate) fn complete(&mut self, outcome: JobOutcome) -> bool {
		if self.status == JobStatus::Completed {
			return false;
		}
		self.status = JobStatus::Completed;
		self.result = Some(outcome);
		true
	}
}

/// Current wall-clock time as unix seconds.
pub fn now_ts() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

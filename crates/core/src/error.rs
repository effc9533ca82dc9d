//! Error types shared by the lifecycle manager, the job registry and the gateway.

use thiserror::Error;

use crate::job::JobId;

/// Result alias for gateway-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure raised while creating, binding or closing an automation session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
	/// Connectivity or startup failure worth retrying (browser not yet
	/// listening, refused connection, read timeout).
	#[error("transient session failure: {0}")]
	Transient(String),

	/// Failure that retrying cannot fix (missing executable, bad configuration).
	#[error("session failure: {0}")]
	Fatal(String),
}

impl SessionError {
	pub fn transient(message: impl Into<String>) -> Self {
		Self::Transient(message.into())
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		Self::Fatal(message.into())
	}

	/// Returns `true` for the failure classes the inner backoff retries.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient(_))
	}
}

/// Failure reported by a [`Verifier`](crate::Verifier) for a single identifier.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct VerificationError {
	pub reason: String,
}

impl VerificationError {
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}
}

/// Errors surfaced by the [`Gateway`](crate::Gateway) boundary.
#[derive(Debug, Error)]
pub enum Error {
	#[error("unknown service '{0}'")]
	UnknownService(String),

	#[error("job {id} not found for service '{service}'")]
	JobNotFound { service: String, id: JobId },

	/// The session could not be started on demand. Distinct from a job failure.
	#[error("failed to start session for service '{0}'")]
	StartFailed(String),
}

use std::io;

use thiserror::Error;
use verifyd::{SessionError, VerificationError};

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
	#[error("could not find a Chrome/Chromium executable; install one or pass --chrome <path>")]
	BrowserNotFound,

	#[error("failed to launch browser at {path}: {source}")]
	Spawn {
		path: String,
		#[source]
		source: io::Error,
	},

	#[error("browser exited before its debugging endpoint came up ({0})")]
	Exited(String),

	#[error("CDP error: {0}")]
	Cdp(String),

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

impl RuntimeError {
	/// Startup and connectivity failures are worth another try; a missing or
	/// unlaunchable executable and bad configuration are not.
	pub fn is_transient(&self) -> bool {
		match self {
			RuntimeError::BrowserNotFound | RuntimeError::Config(_) => false,
			RuntimeError::Spawn { source, .. } => !matches!(source.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied),
			RuntimeError::Exited(_) | RuntimeError::Cdp(_) | RuntimeError::Http(_) | RuntimeError::Io(_) => true,
		}
	}
}

impl From<RuntimeError> for SessionError {
	fn from(err: RuntimeError) -> Self {
		if err.is_transient() {
			SessionError::Transient(err.to_string())
		} else {
			SessionError::Fatal(err.to_string())
		}
	}
}

impl From<RuntimeError> for VerificationError {
	fn from(err: RuntimeError) -> Self {
		VerificationError::new(err.to_string())
	}
}

//! Capability seams between the lifecycle manager and concrete automation.
//!
//! The manager only knows how to create a [`Session`] through a
//! [`SessionProvider`], bind a [`Verifier`] to it, and close it again. What a
//! check actually does on the third-party site lives behind [`Verifier::check`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{SessionError, VerificationError};

/// Answers "is this identifier available?" using a live session.
#[async_trait]
pub trait Verifier: Send + Sync {
	async fn check(&self, identifier: &str) -> Result<bool, VerificationError>;
}

/// One live automation session (for instance a running browser).
#[async_trait]
pub trait Session: Send + Sync {
	/// Short label used in logs (endpoint, pid, ...).
	fn describe(&self) -> String;

	/// Builds the verifier bound to this session.
	async fn verifier(&self) -> Result<Arc<dyn Verifier>, SessionError>;

	/// Releases the underlying resource.
	async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Factory for sessions of one service.
#[async_trait]
pub trait SessionProvider: Send + Sync {
	async fn create(&self) -> Result<Box<dyn Session>, SessionError>;
}

//! Shared automation sessions for asynchronous availability checks.
//!
//! Callers submit identifiers per service and poll for results by job id. Each
//! service owns one [`SessionManager`] that keeps at most one expensive
//! session alive, starts it on demand, retires it when idle, and drains the
//! service's [`JobQueue`] through a [`Verifier`] bound to that session.

/// Manager and registry tunables.
pub mod config;
/// Error taxonomy for sessions, verification and the gateway.
pub mod error;
/// Boundary facade keyed by service name.
pub mod gateway;
/// Job records and outcomes.
pub mod job;
/// Session lifecycle manager and its background loops.
pub mod manager;
/// Per-service pending FIFO and status map.
pub mod queue;
/// Service name to queue registry with periodic sweep.
pub mod registry;
/// Exponential and linear retry combinators.
pub mod retry;
/// Capability traits implemented by session providers.
pub mod verifier;

pub use config::{ManagerConfig, RegistryConfig};
pub use error::{Error, Result, SessionError, VerificationError};
pub use gateway::Gateway;
pub use job::{Job, JobId, JobOutcome, JobStatus};
pub use manager::{SessionManager, SessionState, SessionStatus};
pub use queue::JobQueue;
pub use registry::{ServiceRegistry, Sweeper};
pub use retry::{Backoff, LinearRetry};
pub use verifier::{Session, SessionProvider, Verifier};

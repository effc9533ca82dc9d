//! Lifecycle of the single automation session owned by one service.
//!
//! A [`SessionManager`] creates its session on [`start`](SessionManager::start)
//! through the layered retry in [`crate::retry`], then supervises two tasks:
//!
//! - the processing loop, which drains the service's [`JobQueue`] through the
//!   bound [`Verifier`] and records every outcome;
//! - the idle monitor, which stops the session once no activity has been seen
//!   for `idle_timeout`.
//!
//! Start and stop are serialized by one async mutex that is held across
//! session creation and teardown, so at most one session exists at a time.
//! Job records live behind the queue's own lock; the two are never held
//! together.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::error::SessionError;
use crate::job::{JobOutcome, now_ts};
use crate::queue::JobQueue;
use crate::verifier::{Session, SessionProvider, Verifier};

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	Stopped,
	Starting,
	Running,
	Stopping,
}

/// Snapshot returned by [`SessionManager::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
	pub service: String,
	pub state: SessionState,
	pub running: bool,
	/// Unix seconds of the last recorded activity; absent while not running.
	pub last_activity: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Activity {
	at: Instant,
	ts: u64,
}

impl Activity {
	fn now() -> Self {
		Self {
			at: Instant::now(),
			ts: now_ts(),
		}
	}
}

#[derive(Debug)]
struct Status {
	state: SessionState,
	last_activity: Option<Activity>,
}

/// Cancellation signal shared by the loops of one run.
struct RunSignal {
	running: AtomicBool,
	stopped: Notify,
}

impl RunSignal {
	fn new() -> Self {
		Self {
			running: AtomicBool::new(true),
			stopped: Notify::new(),
		}
	}

	fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	fn cancel(&self) {
		self.running.store(false, Ordering::Release);
		// Only the idle monitor waits on this; notify_one keeps the permit if it is between polls.
		self.stopped.notify_one();
	}
}

/// Everything that exists only while a session is live.
struct Run {
	session: Box<dyn Session>,
	verifier: Arc<dyn Verifier>,
	signal: Arc<RunSignal>,
	processor: JoinHandle<()>,
	monitor: JoinHandle<()>,
}

enum StopOrigin {
	Caller,
	/// Issued by the idle monitor of the run owning this signal.
	IdleMonitor(Arc<RunSignal>),
}

impl StopOrigin {
	fn owns(&self, run: &Run) -> bool {
		match self {
			StopOrigin::Caller => true,
			StopOrigin::IdleMonitor(signal) => Arc::ptr_eq(signal, &run.signal),
		}
	}
}

struct Inner {
	service: String,
	provider: Arc<dyn SessionProvider>,
	queue: Arc<JobQueue>,
	config: ManagerConfig,
	run: Mutex<Option<Run>>,
	status: parking_lot::Mutex<Status>,
}

/// Owns at most one live session for a service. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
	inner: Arc<Inner>,
}

impl SessionManager {
	pub fn new(service: impl Into<String>, provider: Arc<dyn SessionProvider>, queue: Arc<JobQueue>, config: ManagerConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				service: service.into(),
				provider,
				queue,
				config,
				run: Mutex::new(None),
				status: parking_lot::Mutex::new(Status {
					state: SessionState::Stopped,
					last_activity: None,
				}),
			}),
		}
	}

	pub fn service(&self) -> &str {
		&self.inner.service
	}

	pub fn queue(&self) -> &Arc<JobQueue> {
		&self.inner.queue
	}

	pub fn config(&self) -> &ManagerConfig {
		&self.inner.config
	}

	/// Creates the session and launches the background loops.
	///
	/// Returns `false` when a session is already running or when every
	/// creation attempt failed.
	pub async fn start(&self) -> bool {
		self.inner.start().await
	}

	/// Stops the loops and releases the session. Returns `false` if nothing was running.
	pub async fn stop(&self) -> bool {
		self.inner.stop(StopOrigin::Caller).await
	}

	/// Non-blocking; a start in progress reports `false`.
	pub fn is_running(&self) -> bool {
		self.inner.status.lock().state == SessionState::Running
	}

	pub fn status(&self) -> SessionStatus {
		let status = self.inner.status.lock();
		SessionStatus {
			service: self.inner.service.clone(),
			state: status.state,
			running: status.state == SessionState::Running,
			last_activity: status.last_activity.map(|a| a.ts),
		}
	}

	/// Records activity, postponing the idle shutdown. Ignored while not running.
	pub fn touch(&self) {
		self.inner.touch();
	}
}

impl std::fmt::Debug for SessionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionManager")
			.field("service", &self.inner.service)
			.field("state", &self.inner.status.lock().state)
			.finish()
	}
}

impl Inner {
	async fn start(self: &Arc<Self>) -> bool {
		let mut slot = self.run.lock().await;
		if slot.is_some() {
			info!(target = "verifyd.session", service = %self.service, "session already running");
			return false;
		}

		self.set_state(SessionState::Starting);
		let (session, verifier) = match self.acquire().await {
			Ok(parts) => parts,
			Err(err) => {
				error!(
					target = "verifyd.session",
					service = %self.service,
					error = %err,
					"unable to start session; giving up"
				);
				self.set_state(SessionState::Stopped);
				return false;
			}
		};

		{
			let mut status = self.status.lock();
			status.state = SessionState::Running;
			status.last_activity = Some(Activity::now());
		}

		let signal = Arc::new(RunSignal::new());
		let processor = tokio::spawn(process_jobs(Arc::clone(self), Arc::clone(&verifier), Arc::clone(&signal)));
		let monitor = tokio::spawn(monitor_idle(Arc::clone(self), Arc::clone(&signal)));

		info!(target = "verifyd.session", service = %self.service, session = %session.describe(), "session started");
		*slot = Some(Run {
			session,
			verifier,
			signal,
			processor,
			monitor,
		});
		true
	}

	/// Creates a session and binds its verifier, retrying on two levels.
	async fn acquire(&self) -> Result<(Box<dyn Session>, Arc<dyn Verifier>), SessionError> {
		let backoff = self.config.creation_backoff;
		let max_attempts = self.config.max_retries;

		self.config
			.creation_retry()
			.run(move |attempt| async move {
				info!(
					target = "verifyd.session",
					service = %self.service,
					attempt,
					max_attempts,
					"starting session"
				);
				let session = backoff.retry(|| self.provider.create(), SessionError::is_transient).await?;
				match session.verifier().await {
					Ok(verifier) => Ok((session, verifier)),
					Err(err) => {
						self.discard(session).await;
						Err(err)
					}
				}
			})
			.await
	}

	async fn discard(&self, session: Box<dyn Session>) {
		let label = session.describe();
		if let Err(err) = session.close().await {
			warn!(
				target = "verifyd.session",
				service = %self.service,
				session = %label,
				error = %err,
				"failed to close session"
			);
		}
	}

	async fn stop(&self, origin: StopOrigin) -> bool {
		let mut slot = self.run.lock().await;
		let run = match slot.take() {
			Some(run) if origin.owns(&run) => run,
			other => {
				*slot = other;
				debug!(target = "verifyd.session", service = %self.service, "stop requested but no session running");
				return false;
			}
		};

		info!(target = "verifyd.session", service = %self.service, "stopping session");
		self.set_state(SessionState::Stopping);

		let Run {
			session,
			verifier,
			signal,
			processor,
			monitor,
		} = run;
		signal.cancel();
		drop(verifier);

		// An in-flight check is allowed to finish; the processor is never aborted.
		self.join_loop("processor", processor, false).await;
		match origin {
			StopOrigin::IdleMonitor(_) => {
				debug!(target = "verifyd.session", service = %self.service, "stop issued by idle monitor; not joining itself");
			}
			StopOrigin::Caller => self.join_loop("idle monitor", monitor, true).await,
		}

		self.discard(session).await;

		{
			let mut status = self.status.lock();
			status.state = SessionState::Stopped;
			status.last_activity = None;
		}
		info!(target = "verifyd.session", service = %self.service, "session stopped");
		true
	}

	async fn join_loop(&self, name: &'static str, mut handle: JoinHandle<()>, abort_on_timeout: bool) {
		match tokio::time::timeout(self.config.join_timeout, &mut handle).await {
			Ok(Ok(())) => {}
			Ok(Err(err)) => warn!(
				target = "verifyd.session",
				service = %self.service,
				task = name,
				error = %err,
				"background loop ended abnormally"
			),
			Err(_) => {
				warn!(
					target = "verifyd.session",
					service = %self.service,
					task = name,
					timeout_ms = self.config.join_timeout.as_millis() as u64,
					"background loop did not exit in time; continuing shutdown"
				);
				if abort_on_timeout {
					handle.abort();
				}
			}
		}
	}

	fn set_state(&self, state: SessionState) {
		self.status.lock().state = state;
	}

	fn touch(&self) {
		let mut status = self.status.lock();
		if status.state == SessionState::Running {
			status.last_activity = Some(Activity::now());
		}
	}

	fn idle_for(&self) -> Option<Duration> {
		self.status.lock().last_activity.map(|a| a.at.elapsed())
	}
}

async fn process_jobs(inner: Arc<Inner>, verifier: Arc<dyn Verifier>, signal: Arc<RunSignal>) {
	debug!(target = "verifyd.session", service = %inner.service, "processing loop started");
	while signal.is_running() {
		let Some(job) = inner.queue.next_pending(inner.config.job_poll_interval).await else {
			continue;
		};

		let outcome = match AssertUnwindSafe(verifier.check(&job.payload)).catch_unwind().await {
			Ok(Ok(available)) => {
				debug!(target = "verifyd.session", service = %inner.service, job = %job.id, available, "job verified");
				JobOutcome::available(job.payload.clone(), available)
			}
			Ok(Err(err)) => {
				warn!(target = "verifyd.session", service = %inner.service, job = %job.id, error = %err, "verification failed");
				JobOutcome::failed(job.payload.clone(), err.to_string())
			}
			Err(panic) => {
				let message = panic_message(panic.as_ref());
				error!(target = "verifyd.session", service = %inner.service, job = %job.id, panic = %message, "verifier panicked");
				JobOutcome::failed(job.payload.clone(), message)
			}
		};

		if inner.queue.complete(&job.id, outcome).is_none() {
			debug!(target = "verifyd.session", service = %inner.service, job = %job.id, "job swept before completion; result dropped");
		}
		// A processor that outlived its stop must not refresh a newer run's activity.
		if signal.is_running() {
			inner.touch();
		}
	}
	debug!(target = "verifyd.session", service = %inner.service, "processing loop exited");
}

async fn monitor_idle(inner: Arc<Inner>, signal: Arc<RunSignal>) {
	let poll = inner.config.idle_poll_interval;
	let idle_timeout = inner.config.idle_timeout;
	while signal.is_running() {
		tokio::select! {
			_ = tokio::time::sleep(poll) => {}
			_ = signal.stopped.notified() => break,
		}

		if !signal.is_running() {
			break;
		}

		if let Some(idle) = inner.idle_for().filter(|idle| *idle > idle_timeout) {
			info!(
				target = "verifyd.session",
				service = %inner.service,
				idle_secs = idle.as_secs(),
				"session idle; shutting down"
			);
			inner.stop(StopOrigin::IdleMonitor(Arc::clone(&signal))).await;
			break;
		}
	}
	debug!(target = "verifyd.session", service = %inner.service, "idle monitor exited");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		format!("verifier panicked: {message}")
	} else if let Some(message) = panic.downcast_ref::<String>() {
		format!("verifier panicked: {message}")
	} else {
		"verifier panicked".to_string()
	}
}

//! In-memory session provider and verifier for lifecycle tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use verifyd::{Backoff, JobId, JobQueue, ManagerConfig, Session, SessionError, SessionProvider, VerificationError, Verifier};

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Short intervals so clock-driven scenarios finish quickly under a paused clock.
pub fn fast_config() -> ManagerConfig {
	ManagerConfig {
		idle_timeout: Duration::from_secs(60),
		max_retries: 3,
		retry_delay: Duration::from_millis(100),
		creation_backoff: Backoff {
			max_tries: 3,
			base_delay: Duration::from_millis(10),
			max_delay: Duration::from_secs(1),
		},
		job_poll_interval: Duration::from_millis(20),
		idle_poll_interval: Duration::from_millis(50),
		join_timeout: Duration::from_secs(1),
	}
}

#[derive(Default)]
pub struct Counters {
	/// Calls to `create`, successful or not.
	pub attempts: AtomicU32,
	/// Sessions actually handed out.
	pub created: AtomicU32,
	pub closed: AtomicU32,
	/// Highest number of sessions alive at the same time.
	pub peak_live: AtomicU32,
	live: AtomicU32,
}

impl Counters {
	pub fn attempts(&self) -> u32 {
		self.attempts.load(Ordering::SeqCst)
	}

	pub fn created(&self) -> u32 {
		self.created.load(Ordering::SeqCst)
	}

	pub fn closed(&self) -> u32 {
		self.closed.load(Ordering::SeqCst)
	}

	pub fn live(&self) -> u32 {
		self.live.load(Ordering::SeqCst)
	}

	pub fn peak_live(&self) -> u32 {
		self.peak_live.load(Ordering::SeqCst)
	}
}

pub struct FakeProvider {
	pub counters: Arc<Counters>,
	create_failures: Mutex<VecDeque<SessionError>>,
	bind_failures: Mutex<VecDeque<SessionError>>,
	create_delay: Duration,
}

impl FakeProvider {
	pub fn new() -> Arc<Self> {
		Self::build(Vec::new(), Vec::new(), Duration::ZERO)
	}

	/// Fails the first creation calls with `failures`, in order.
	pub fn failing(failures: Vec<SessionError>) -> Arc<Self> {
		Self::build(failures, Vec::new(), Duration::ZERO)
	}

	/// Fails the first verifier bindings with `failures`, in order.
	pub fn failing_bind(failures: Vec<SessionError>) -> Arc<Self> {
		Self::build(Vec::new(), failures, Duration::ZERO)
	}

	pub fn slow(delay: Duration) -> Arc<Self> {
		Self::build(Vec::new(), Vec::new(), delay)
	}

	fn build(create_failures: Vec<SessionError>, bind_failures: Vec<SessionError>, create_delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			counters: Arc::new(Counters::default()),
			create_failures: Mutex::new(create_failures.into()),
			bind_failures: Mutex::new(bind_failures.into()),
			create_delay,
		})
	}

	pub fn as_provider(self: &Arc<Self>) -> Arc<dyn SessionProvider> {
		Arc::clone(self) as Arc<dyn SessionProvider>
	}
}

#[async_trait]
impl SessionProvider for FakeProvider {
	async fn create(&self) -> Result<Box<dyn Session>, SessionError> {
		self.counters.attempts.fetch_add(1, Ordering::SeqCst);
		if !self.create_delay.is_zero() {
			tokio::time::sleep(self.create_delay).await;
		}
		if let Some(err) = self.create_failures.lock().pop_front() {
			return Err(err);
		}

		let number = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
		let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
		self.counters.peak_live.fetch_max(live, Ordering::SeqCst);
		let bind_failure = self.bind_failures.lock().pop_front();
		Ok(Box::new(FakeSession {
			number,
			counters: Arc::clone(&self.counters),
			bind_failure,
		}))
	}
}

struct FakeSession {
	number: u32,
	counters: Arc<Counters>,
	bind_failure: Option<SessionError>,
}

#[async_trait]
impl Session for FakeSession {
	fn describe(&self) -> String {
		format!("fake-{}", self.number)
	}

	async fn verifier(&self) -> Result<Arc<dyn Verifier>, SessionError> {
		match &self.bind_failure {
			Some(err) => Err(err.clone()),
			None => Ok(Arc::new(ScriptedVerifier)),
		}
	}

	async fn close(self: Box<Self>) -> Result<(), SessionError> {
		self.counters.live.fetch_sub(1, Ordering::SeqCst);
		self.counters.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Answers by prefix: `taken*` is unavailable, `fail*` errors, `panic*`
/// panics, `slow*` takes five seconds, anything else is available.
pub struct ScriptedVerifier;

#[async_trait]
impl Verifier for ScriptedVerifier {
	async fn check(&self, identifier: &str) -> Result<bool, VerificationError> {
		if identifier.starts_with("fail") {
			return Err(VerificationError::new(format!("could not reach signup page for {identifier}")));
		}
		if identifier.starts_with("panic") {
			panic!("selector vanished");
		}
		if identifier.starts_with("slow") {
			tokio::time::sleep(Duration::from_secs(5)).await;
		}
		Ok(!identifier.starts_with("taken"))
	}
}

/// Polls until the job completes or ten simulated seconds pass.
pub async fn wait_for_completion(queue: &JobQueue, id: &JobId) -> verifyd::Job {
	for _ in 0..1000 {
		if let Some(job) = queue.status_of(id) {
			if !job.is_pending() {
				return job;
			}
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("job {id} did not complete in time");
}

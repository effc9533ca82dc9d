//! Per-service job queue and status registry.
//!
//! A [`JobQueue`] owns three things for one service: the FIFO of jobs waiting
//! for the session, the authoritative `JobId -> Job` map every poller reads,
//! and a broadcast feed of completed jobs. The FIFO and the map share one
//! lock so a job is never visible in one without the other.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::job::{Job, JobId, JobOutcome};

const COMPLETED_FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct QueueState {
	jobs: HashMap<JobId, Job>,
	pending: VecDeque<JobId>,
}

pub struct JobQueue {
	service: String,
	state: Mutex<QueueState>,
	wakeup: Notify,
	completed: broadcast::Sender<Job>,
}

impl JobQueue {
	pub fn new(service: impl Into<String>) -> Self {
		let (completed, _) = broadcast::channel(COMPLETED_FEED_CAPACITY);
		Self {
			service: service.into(),
			state: Mutex::new(QueueState::default()),
			wakeup: Notify::new(),
			completed,
		}
	}

	pub fn service(&self) -> &str {
		&self.service
	}

	/// Registers a new pending job and queues it for processing.
	pub fn submit(&self, payload: impl Into<String>) -> Job {
		let job = Job::pending(payload.into());
		{
			let mut state = self.state.lock();
			state.jobs.insert(job.id, job.clone());
			state.pending.push_back(job.id);
		}
		self.wakeup.notify_one();
		debug!(target = "verifyd.queue", service = %self.service, job = %job.id, "job submitted");
		job
	}

	/// Records the outcome of a job.
	///
	/// Returns `None` when the id is unknown, typically because the sweep
	/// already dropped it. A job that is already completed keeps its first
	/// outcome and is returned unchanged.
	pub fn complete(&self, id: &JobId, outcome: JobOutcome) -> Option<Job> {
		let mut state = self.state.lock();
		let job = state.jobs.get_mut(id)?;
		if !job.complete(outcome) {
			return Some(job.clone());
		}
		let snapshot = job.clone();
		// No subscribers is fine; the map stays authoritative.
		let _ = self.completed.send(snapshot.clone());
		Some(snapshot)
	}

	pub fn status_of(&self, id: &JobId) -> Option<Job> {
		self.state.lock().jobs.get(id).cloned()
	}

	/// Drops every job submitted more than `max_age` ago, whatever its status.
	pub fn sweep(&self, max_age: Duration) -> usize {
		self.sweep_at(Instant::now(), max_age)
	}

	fn sweep_at(&self, now: Instant, max_age: Duration) -> usize {
		let mut state = self.state.lock();
		let before = state.jobs.len();
		state.jobs.retain(|_, job| now.saturating_duration_since(job.submitted_at) <= max_age);
		let QueueState { jobs, pending } = &mut *state;
		pending.retain(|id| jobs.contains_key(id));
		let removed = before - state.jobs.len();
		if removed > 0 {
			debug!(target = "verifyd.queue", service = %self.service, removed, "swept aged jobs");
		}
		removed
	}

	/// Takes the oldest pending job, waiting up to `wait` for one to arrive.
	pub async fn next_pending(&self, wait: Duration) -> Option<Job> {
		let deadline = Instant::now() + wait;
		loop {
			let notified = self.wakeup.notified();
			if let Some(job) = self.pop_pending() {
				return Some(job);
			}
			if tokio::time::timeout_at(deadline, notified).await.is_err() {
				return self.pop_pending();
			}
		}
	}

	fn pop_pending(&self) -> Option<Job> {
		let mut state = self.state.lock();
		while let Some(id) = state.pending.pop_front() {
			match state.jobs.get(&id) {
				Some(job) if job.is_pending() => return Some(job.clone()),
				_ => trace!(target = "verifyd.queue", service = %self.service, job = %id, "skipping swept job"),
			}
		}
		None
	}

	/// Subscribes to jobs as they complete. Lagging receivers lose the oldest entries.
	pub fn subscribe_completed(&self) -> broadcast::Receiver<Job> {
		self.completed.subscribe()
	}

	pub fn pending_len(&self) -> usize {
		self.state.lock().pending.len()
	}

	/// Number of tracked jobs, pending or completed.
	pub fn len(&self) -> usize {
		self.state.lock().jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for JobQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JobQueue")
			.field("service", &self.service)
			.field("jobs", &self.len())
			.field("pending", &self.pending_len())
			.finish()
	}
}

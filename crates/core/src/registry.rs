//! Service name to [`JobQueue`] registry with a background sweep.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::RegistryConfig;
use crate::queue::JobQueue;

/// Hands out one [`JobQueue`] per service name for the life of the process.
///
/// Constructed once by the entry point and shared by `Arc`; the lock only
/// guards queue creation, never job contents.
#[derive(Debug)]
pub struct ServiceRegistry {
	config: RegistryConfig,
	queues: Mutex<HashMap<String, Arc<JobQueue>>>,
}

impl ServiceRegistry {
	pub fn new(config: RegistryConfig) -> Self {
		Self {
			config,
			queues: Mutex::new(HashMap::new()),
		}
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.config
	}

	/// Returns the queue for `service`, creating it on first use.
	pub fn get_or_create(&self, service: &str) -> Arc<JobQueue> {
		let mut queues = self.queues.lock();
		let queue = queues.entry(service.to_string()).or_insert_with(|| {
			debug!(target = "verifyd.registry", service, "creating job queue");
			Arc::new(JobQueue::new(service))
		});
		Arc::clone(queue)
	}

	pub fn get(&self, service: &str) -> Option<Arc<JobQueue>> {
		self.queues.lock().get(service).cloned()
	}

	pub fn services(&self) -> Vec<String> {
		let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
		names.sort();
		names
	}

	/// Sweeps every registered queue and returns the number of jobs dropped.
	///
	/// A queue whose sweep panics is logged and skipped.
	pub fn sweep_all(&self, max_age: Duration) -> usize {
		let queues: Vec<Arc<JobQueue>> = self.queues.lock().values().cloned().collect();
		let mut removed = 0;
		for queue in queues {
			match catch_unwind(AssertUnwindSafe(|| queue.sweep(max_age))) {
				Ok(count) => removed += count,
				Err(_) => error!(target = "verifyd.registry", service = queue.service(), "sweep panicked; skipping queue"),
			}
		}
		removed
	}

	/// Starts the periodic sweep task.
	pub fn spawn_sweeper(self: &Arc<Self>) -> Sweeper {
		let (stop_tx, mut stop_rx) = watch::channel(false);
		let registry = Arc::clone(self);
		let interval = self.config.sweep_interval;
		let max_age = self.config.max_age;

		let handle = tokio::spawn(async move {
			info!(target = "verifyd.registry", interval_secs = interval.as_secs(), max_age_secs = max_age.as_secs(), "sweeper started");
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						let removed = registry.sweep_all(max_age);
						debug!(target = "verifyd.registry", removed, "sweep pass finished");
					}
					changed = stop_rx.changed() => {
						if changed.is_err() || *stop_rx.borrow() {
							break;
						}
					}
				}
			}
			info!(target = "verifyd.registry", "sweeper stopped");
		});

		Sweeper { stop: stop_tx, handle }
	}
}

impl Default for ServiceRegistry {
	fn default() -> Self {
		Self::new(RegistryConfig::default())
	}
}

/// Handle to the background sweep task.
pub struct Sweeper {
	stop: watch::Sender<bool>,
	handle: JoinHandle<()>,
}

impl Sweeper {
	/// Signals the sweep loop to exit and waits for it.
	pub async fn shutdown(self) {
		let _ = self.stop.send(true);
		if let Err(err) = self.handle.await {
			error!(target = "verifyd.registry", error = %err, "sweeper task failed");
		}
	}
}

//! Inbound boundary: submit, poll, and start/stop sessions by service name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::job::{Job, JobId};
use crate::manager::{SessionManager, SessionStatus};
use crate::registry::ServiceRegistry;
use crate::verifier::SessionProvider;

/// Routes boundary calls to the [`SessionManager`] of each registered service.
pub struct Gateway {
	registry: Arc<ServiceRegistry>,
	config: ManagerConfig,
	managers: RwLock<HashMap<String, SessionManager>>,
}

impl Gateway {
	pub fn new(registry: Arc<ServiceRegistry>, config: ManagerConfig) -> Self {
		Self {
			registry,
			config,
			managers: RwLock::new(HashMap::new()),
		}
	}

	pub fn registry(&self) -> &Arc<ServiceRegistry> {
		&self.registry
	}

	/// Registers `service` with the provider creating its sessions.
	///
	/// Registering a name twice keeps the first manager.
	pub fn register(&self, service: &str, provider: Arc<dyn SessionProvider>) -> SessionManager {
		let mut managers = self.managers.write();
		if let Some(existing) = managers.get(service) {
			warn!(target = "verifyd.gateway", service, "service already registered; keeping existing manager");
			return existing.clone();
		}
		let queue = self.registry.get_or_create(service);
		let manager = SessionManager::new(service, provider, queue, self.config.clone());
		managers.insert(service.to_string(), manager.clone());
		info!(target = "verifyd.gateway", service, "service registered");
		manager
	}

	pub fn manager(&self, service: &str) -> Result<SessionManager> {
		self.managers
			.read()
			.get(service)
			.cloned()
			.ok_or_else(|| Error::UnknownService(service.to_string()))
	}

	pub fn services(&self) -> Vec<String> {
		let mut names: Vec<String> = self.managers.read().keys().cloned().collect();
		names.sort();
		names
	}

	/// Queues `payload` for `service`, starting its session if needed.
	///
	/// Fails with [`Error::StartFailed`] when the session cannot be started;
	/// in that case nothing is queued.
	pub async fn submit(&self, service: &str, payload: impl Into<String>) -> Result<Job> {
		let manager = self.manager(service)?;
		if !manager.is_running() && !manager.start().await && !manager.is_running() {
			return Err(Error::StartFailed(service.to_string()));
		}
		manager.touch();
		Ok(manager.queue().submit(payload))
	}

	pub fn status_of(&self, service: &str, id: &JobId) -> Result<Job> {
		let manager = self.manager(service)?;
		manager.queue().status_of(id).ok_or_else(|| Error::JobNotFound {
			service: service.to_string(),
			id: *id,
		})
	}

	pub async fn start_resource(&self, service: &str) -> Result<bool> {
		Ok(self.manager(service)?.start().await)
	}

	pub async fn stop_resource(&self, service: &str) -> Result<bool> {
		Ok(self.manager(service)?.stop().await)
	}

	pub fn resource_status(&self, service: &str) -> Result<SessionStatus> {
		Ok(self.manager(service)?.status())
	}

	/// Stops every running session. Used on process exit.
	pub async fn shutdown(&self) {
		let managers: Vec<SessionManager> = self.managers.read().values().cloned().collect();
		for manager in managers {
			if manager.stop().await {
				info!(target = "verifyd.gateway", service = manager.service(), "session stopped on shutdown");
			}
		}
	}
}

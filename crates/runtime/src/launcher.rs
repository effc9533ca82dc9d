//! Chromium-backed [`SessionProvider`].
//!
//! Each session is a dedicated browser process with its own throwaway
//! profile directory and remote-debugging port. Checks run over the DevTools
//! HTTP endpoint through [`CdpPageVerifier`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use verifyd::{Session, SessionError, SessionProvider, Verifier};

use crate::browser_finder::find_chrome_executable;
use crate::cdp::{CdpClient, CdpVersionInfo};
use crate::error::{Result, RuntimeError};
use crate::page_verifier::{CdpPageVerifier, PageCheck};
use crate::process::{free_port, terminate};

/// Browser launch settings shared by every session of a provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumConfig {
	/// Explicit executable; discovered on PATH and well-known locations when unset.
	pub executable: Option<PathBuf>,
	pub headless: bool,
	/// Endpoint probes after spawn before the launch counts as failed.
	pub startup_attempts: u32,
	pub probe_interval: Duration,
	pub close_timeout: Duration,
	pub extra_args: Vec<String>,
}

impl Default for ChromiumConfig {
	fn default() -> Self {
		Self {
			executable: None,
			headless: true,
			startup_attempts: 25,
			probe_interval: Duration::from_millis(200),
			close_timeout: Duration::from_secs(5),
			extra_args: Vec::new(),
		}
	}
}

impl ChromiumConfig {
	pub fn resolve_executable(&self) -> Result<PathBuf> {
		match &self.executable {
			Some(path) => Ok(path.clone()),
			None => find_chrome_executable().ok_or(RuntimeError::BrowserNotFound),
		}
	}
}

/// Command-line arguments for one browser process.
pub fn chrome_args(config: &ChromiumConfig, port: u16, user_data_dir: &std::path::Path) -> Vec<String> {
	let mut args = vec![
		format!("--remote-debugging-port={port}"),
		format!("--user-data-dir={}", user_data_dir.display()),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
		"--disable-gpu".to_string(),
		"--no-sandbox".to_string(),
		"--disable-dev-shm-usage".to_string(),
	];
	if config.headless {
		args.push("--headless=new".to_string());
	}
	args.extend(config.extra_args.iter().cloned());
	args.push("about:blank".to_string());
	args
}

/// Launches one Chromium per session and checks identifiers with `check`.
pub struct ChromiumProvider {
	config: ChromiumConfig,
	check: PageCheck,
	http: reqwest::Client,
}

impl ChromiumProvider {
	pub fn new(config: ChromiumConfig, check: PageCheck) -> Result<Self> {
		let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
		Ok(Self { config, check, http })
	}

	async fn launch(&self) -> Result<ChromiumSession> {
		let executable = self.config.resolve_executable()?;
		let port = free_port()?;
		let user_data_dir = tempfile::Builder::new().prefix("verifyd-profile-").tempdir()?;
		let args = chrome_args(&self.config, port, user_data_dir.path());

		let mut cmd = Command::new(&executable);
		cmd.args(&args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true);

		let mut child = cmd.spawn().map_err(|source| RuntimeError::Spawn {
			path: executable.display().to_string(),
			source,
		})?;
		debug!(target = "verifyd.runtime", pid = ?child.id(), port, executable = %executable.display(), "browser spawned");

		let client = CdpClient::for_port(self.http.clone(), port);
		match self.wait_for_endpoint(&mut child, &client).await {
			Ok(info) => {
				info!(
					target = "verifyd.runtime",
					pid = ?child.id(),
					port,
					browser = info.browser.as_deref().unwrap_or("unknown"),
					"browser ready"
				);
				Ok(ChromiumSession {
					pid: child.id(),
					port,
					child: Mutex::new(Some(child)),
					client,
					check: self.check.clone(),
					close_timeout: self.config.close_timeout,
					_user_data_dir: user_data_dir,
				})
			}
			Err(err) => {
				if let Err(kill_err) = terminate(&mut child, self.config.close_timeout).await {
					warn!(target = "verifyd.runtime", error = %kill_err, "failed to kill browser after failed launch");
				}
				Err(err)
			}
		}
	}

	async fn wait_for_endpoint(&self, child: &mut Child, client: &CdpClient) -> Result<CdpVersionInfo> {
		let mut last_error = "endpoint not reachable".to_string();
		for _ in 0..self.config.startup_attempts {
			tokio::time::sleep(self.config.probe_interval).await;

			if let Some(status) = child.try_wait()? {
				return Err(RuntimeError::Exited(status.to_string()));
			}

			match client.version().await {
				Ok(info) => return Ok(info),
				Err(err) => last_error = err.to_string(),
			}
		}
		Err(RuntimeError::Cdp(format!(
			"debugging endpoint {} not available after {} probes: {last_error}",
			client.base_url(),
			self.config.startup_attempts
		)))
	}
}

#[async_trait]
impl SessionProvider for ChromiumProvider {
	async fn create(&self) -> std::result::Result<Box<dyn Session>, SessionError> {
		let session = self.launch().await?;
		Ok(Box::new(session))
	}
}

/// A running browser process. Dropping it kills the process and removes
/// the profile directory.
pub struct ChromiumSession {
	pid: Option<u32>,
	port: u16,
	child: Mutex<Option<Child>>,
	client: CdpClient,
	check: PageCheck,
	close_timeout: Duration,
	_user_data_dir: TempDir,
}

impl ChromiumSession {
	fn ensure_alive(&self) -> Result<()> {
		let mut guard = self.child.lock();
		let Some(child) = guard.as_mut() else {
			return Err(RuntimeError::Exited("session already closed".into()));
		};
		match child.try_wait()? {
			Some(status) => Err(RuntimeError::Exited(status.to_string())),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl Session for ChromiumSession {
	fn describe(&self) -> String {
		match self.pid {
			Some(pid) => format!("chromium pid={pid} port={}", self.port),
			None => format!("chromium port={}", self.port),
		}
	}

	async fn verifier(&self) -> std::result::Result<Arc<dyn Verifier>, SessionError> {
		self.ensure_alive()?;
		self.client.version().await?;
		Ok(Arc::new(CdpPageVerifier::new(self.client.clone(), self.check.clone())))
	}

	async fn close(self: Box<Self>) -> std::result::Result<(), SessionError> {
		let child = self.child.lock().take();
		if let Some(mut child) = child {
			terminate(&mut child, self.close_timeout).await?;
		}
		debug!(target = "verifyd.runtime", port = self.port, "browser session closed");
		Ok(())
	}
}

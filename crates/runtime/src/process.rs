//! Port and process helpers for launched browsers.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

use crate::error::Result;

/// Asks the OS for an unused localhost port.
///
/// The listener is dropped before returning, so the port is only very likely
/// to still be free when the browser binds it; a lost race surfaces as a
/// transient launch failure and is retried.
pub fn free_port() -> Result<u16> {
	let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

/// Kills `child` and reaps it, waiting at most `grace`.
pub async fn terminate(child: &mut Child, grace: Duration) -> Result<()> {
	let pid = child.id();
	if child.try_wait()?.is_some() {
		debug!(target = "verifyd.runtime", ?pid, "browser already exited");
		return Ok(());
	}

	child.start_kill()?;
	match tokio::time::timeout(grace, child.wait()).await {
		Ok(status) => {
			debug!(target = "verifyd.runtime", ?pid, status = ?status?, "browser terminated");
			Ok(())
		}
		Err(_) => {
			warn!(target = "verifyd.runtime", ?pid, "browser did not exit after kill; leaving it to the OS");
			Ok(())
		}
	}
}

//! Chrome DevTools HTTP endpoints: version probe and target management.
//!
//! Only the `/json/*` HTTP surface is used; no websocket session is opened.

use serde::Deserialize;

use crate::error::{Result, RuntimeError};

/// `/json/version` response subset.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpVersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser")]
	pub browser: Option<String>,
}

/// One entry of `/json/list` (also returned by `/json/new`).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpTarget {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
}

/// HTTP client bound to one browser's debugging endpoint.
#[derive(Debug, Clone)]
pub struct CdpClient {
	http: reqwest::Client,
	base_url: String,
}

impl CdpClient {
	pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
		let base_url = base_url.into().trim_end_matches('/').to_string();
		Self { http, base_url }
	}

	pub fn for_port(http: reqwest::Client, port: u16) -> Self {
		Self::new(http, format!("http://127.0.0.1:{port}"))
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub async fn version(&self) -> Result<CdpVersionInfo> {
		let response = self.http.get(format!("{}/json/version", self.base_url)).send().await?;
		if !response.status().is_success() {
			return Err(RuntimeError::Cdp(format!("/json/version returned {}", response.status())));
		}
		response
			.json()
			.await
			.map_err(|e| RuntimeError::Cdp(format!("failed to parse /json/version: {e}")))
	}

	/// `/json/new` endpoint for `url`. Chrome unescapes the whole query once
	/// before parsing it, so the target URL is escaped as a single component.
	fn new_target_endpoint(&self, url: &str) -> String {
		let escaped: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
		format!("{}/json/new?{escaped}", self.base_url)
	}

	/// Opens a new page target navigating to `url`.
	pub async fn open(&self, url: &str) -> Result<CdpTarget> {
		let response = self.http.put(self.new_target_endpoint(url)).send().await?;
		if !response.status().is_success() {
			return Err(RuntimeError::Cdp(format!("/json/new returned {}", response.status())));
		}
		response
			.json()
			.await
			.map_err(|e| RuntimeError::Cdp(format!("failed to parse /json/new: {e}")))
	}

	pub async fn list(&self) -> Result<Vec<CdpTarget>> {
		let response = self.http.get(format!("{}/json/list", self.base_url)).send().await?;
		if !response.status().is_success() {
			return Err(RuntimeError::Cdp(format!("/json/list returned {}", response.status())));
		}
		response
			.json()
			.await
			.map_err(|e| RuntimeError::Cdp(format!("failed to parse /json/list: {e}")))
	}

	pub async fn close(&self, target_id: &str) -> Result<()> {
		let response = self.http.get(format!("{}/json/close/{}", self.base_url, target_id)).send().await?;
		if !response.status().is_success() {
			return Err(RuntimeError::Cdp(format!("/json/close/{target_id} returned {}", response.status())));
		}
		Ok(())
	}
}

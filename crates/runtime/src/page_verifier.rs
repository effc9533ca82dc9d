//! Identifier checks driven through a browser's DevTools HTTP endpoint.
//!
//! A check opens a fresh page target on the service's lookup URL, waits for
//! the page title to settle, and decides availability by matching the title
//! against a per-service pattern. The target is always closed afterwards.

use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use tracing::{debug, warn};
use verifyd::{VerificationError, Verifier};

use crate::cdp::{CdpClient, CdpTarget};
use crate::error::{Result, RuntimeError};

/// Placeholder substituted with the percent-encoded identifier.
pub const IDENTIFIER_PLACEHOLDER: &str = "{identifier}";

/// What to load and how to read the answer for one service.
#[derive(Debug, Clone)]
pub struct PageCheck {
	url_template: String,
	available_pattern: Regex,
	pub settle_timeout: Duration,
	pub poll_interval: Duration,
}

impl PageCheck {
	pub fn new(url_template: impl Into<String>, available_pattern: &str) -> Result<Self> {
		let url_template = url_template.into();
		if !url_template.contains(IDENTIFIER_PLACEHOLDER) {
			return Err(RuntimeError::Config(format!(
				"url template `{url_template}` has no {IDENTIFIER_PLACEHOLDER} placeholder"
			)));
		}
		url::Url::parse(&url_template.replace(IDENTIFIER_PLACEHOLDER, "x"))
			.map_err(|e| RuntimeError::Config(format!("url template `{url_template}` is not a valid URL: {e}")))?;
		let available_pattern = Regex::new(available_pattern)
			.map_err(|e| RuntimeError::Config(format!("invalid availability pattern `{available_pattern}`: {e}")))?;

		Ok(Self {
			url_template,
			available_pattern,
			settle_timeout: Duration::from_secs(10),
			poll_interval: Duration::from_millis(250),
		})
	}

	pub fn url_template(&self) -> &str {
		&self.url_template
	}

	pub fn target_url(&self, identifier: &str) -> String {
		let encoded: String = url::form_urlencoded::byte_serialize(identifier.as_bytes()).collect();
		self.url_template.replace(IDENTIFIER_PLACEHOLDER, &encoded)
	}

	pub fn is_available(&self, title: &str) -> bool {
		self.available_pattern.is_match(title)
	}
}

/// [`Verifier`] that runs a [`PageCheck`] in the browser behind `client`.
#[derive(Debug, Clone)]
pub struct CdpPageVerifier {
	client: CdpClient,
	check: PageCheck,
}

impl CdpPageVerifier {
	pub fn new(client: CdpClient, check: PageCheck) -> Self {
		Self { client, check }
	}

	async fn run(&self, identifier: &str) -> Result<bool> {
		let url = self.check.target_url(identifier);
		let target = self.client.open(&url).await?;
		debug!(target = "verifyd.runtime", target_id = %target.id, %url, "opened check page");

		let outcome = self.read_title(&target).await;

		if let Err(err) = self.client.close(&target.id).await {
			warn!(target = "verifyd.runtime", target_id = %target.id, error = %err, "failed to close check page");
		}

		let title = outcome?;
		Ok(self.check.is_available(&title))
	}

	/// Polls until the target reports a non-empty title that is not the URL
	/// itself (Chrome shows the URL while the document is still loading).
	async fn read_title(&self, target: &CdpTarget) -> Result<String> {
		let deadline = tokio::time::Instant::now() + self.check.settle_timeout;
		loop {
			let current = self.client.list().await?.into_iter().find(|t| t.id == target.id);
			let Some(current) = current else {
				return Err(RuntimeError::Cdp(format!("page target {} disappeared", target.id)));
			};
			if !current.title.is_empty() && current.title != current.url {
				return Ok(current.title);
			}
			if tokio::time::Instant::now() >= deadline {
				return Err(RuntimeError::Cdp(format!(
					"page {} did not finish loading within {:?}",
					current.url, self.check.settle_timeout
				)));
			}
			tokio::time::sleep(self.check.poll_interval).await;
		}
	}
}

#[async_trait]
impl Verifier for CdpPageVerifier {
	async fn check(&self, identifier: &str) -> std::result::Result<bool, VerificationError> {
		self.run(identifier).await.map_err(VerificationError::from)
	}
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use verifyd::{ManagerConfig, RegistryConfig};
use verifyd_runtime::ChromiumConfig;

/// Matches `local@domain.tld` with no whitespace.
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Page titles that indicate the identifier is not registered yet.
pub const DEFAULT_AVAILABLE_PATTERN: &str = r"(?i)(create (an |your )?account|sign up|couldn.t find)";

#[derive(Parser, Debug)]
#[command(name = "verifyd")]
#[command(about = "Asynchronous identifier availability checks over shared browser sessions")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v debug, -vv trace)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Address to bind the HTTP server to
	#[arg(long, default_value = "127.0.0.1")]
	pub host: String,

	/// Port to bind the HTTP server to
	#[arg(short, long, default_value_t = 8080)]
	pub port: u16,

	/// Service to serve, as NAME=URL_TEMPLATE with an {identifier} placeholder (repeatable)
	#[arg(long = "service", value_name = "NAME=URL_TEMPLATE", required = true)]
	pub services: Vec<ServiceArg>,

	/// Per-service title pattern meaning "available", as NAME=REGEX (repeatable)
	#[arg(long = "available-pattern", value_name = "NAME=REGEX")]
	pub available_patterns: Vec<ServiceArg>,

	/// Title pattern for services without their own --available-pattern
	#[arg(long, value_name = "REGEX", default_value = DEFAULT_AVAILABLE_PATTERN)]
	pub default_available_pattern: String,

	/// Pattern every submitted identifier must match
	#[arg(long, value_name = "REGEX", default_value = DEFAULT_IDENTIFIER_PATTERN)]
	pub identifier_pattern: String,

	/// Chrome/Chromium executable (discovered automatically when omitted)
	#[arg(long, value_name = "PATH")]
	pub chrome: Option<PathBuf>,

	/// Show the browser window instead of running headless
	#[arg(long)]
	pub headful: bool,

	/// Seconds without activity before a session is stopped
	#[arg(long, value_name = "SECS", default_value_t = 300)]
	pub idle_timeout: u64,

	/// Outer attempts when creating a session
	#[arg(long, default_value_t = 3)]
	pub max_retries: u32,

	/// Base delay in seconds between outer creation attempts
	#[arg(long, value_name = "SECS", default_value_t = 5)]
	pub retry_delay: u64,

	/// Seconds after which job records are swept
	#[arg(long, value_name = "SECS", default_value_t = 3600)]
	pub job_max_age: u64,

	/// Seconds between registry sweeps
	#[arg(long, value_name = "SECS", default_value_t = 300)]
	pub sweep_interval: u64,
}

/// `NAME=VALUE` pair naming a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceArg {
	pub name: String,
	pub value: String,
}

impl FromStr for ServiceArg {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (name, value) = s.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got `{s}`"))?;
		let name = name.trim();
		if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
			return Err(format!("invalid service name `{name}`"));
		}
		if value.is_empty() {
			return Err(format!("missing value for service `{name}`"));
		}
		Ok(Self {
			name: name.to_string(),
			value: value.to_string(),
		})
	}
}

impl Cli {
	pub fn manager_config(&self) -> ManagerConfig {
		ManagerConfig {
			idle_timeout: Duration::from_secs(self.idle_timeout),
			max_retries: self.max_retries,
			retry_delay: Duration::from_secs(self.retry_delay),
			..Default::default()
		}
	}

	pub fn registry_config(&self) -> RegistryConfig {
		RegistryConfig {
			sweep_interval: Duration::from_secs(self.sweep_interval),
			max_age: Duration::from_secs(self.job_max_age),
		}
	}

	pub fn chromium_config(&self) -> ChromiumConfig {
		ChromiumConfig {
			executable: self.chrome.clone(),
			headless: !self.headful,
			..Default::default()
		}
	}

	/// Availability pattern for `service`, falling back to the default.
	pub fn available_pattern(&self, service: &str) -> &str {
		self.available_patterns
			.iter()
			.rev()
			.find(|arg| arg.name == service)
			.map(|arg| arg.value.as_str())
			.unwrap_or(&self.default_available_pattern)
	}
}

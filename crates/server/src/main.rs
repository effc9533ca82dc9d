use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use regex_lite::Regex;
use tokio::net::TcpListener;
use tracing::{error, info};
use verifyd::{Gateway, ServiceRegistry};
use verifyd_runtime::{ChromiumProvider, PageCheck};
use verifyd_server::cli::Cli;
use verifyd_server::{AppState, logging, serve};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		error!(target = "verifyd", error = %format!("{err:#}"), "server failed");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let identifier_pattern = Regex::new(&cli.identifier_pattern)
		.with_context(|| format!("invalid --identifier-pattern `{}`", cli.identifier_pattern))?;

	let registry = Arc::new(ServiceRegistry::new(cli.registry_config()));
	let gateway = Arc::new(Gateway::new(registry.clone(), cli.manager_config()));

	for service in &cli.services {
		let check = PageCheck::new(service.value.clone(), cli.available_pattern(&service.name))
			.with_context(|| format!("service `{}`", service.name))?;
		let provider = ChromiumProvider::new(cli.chromium_config(), check)
			.with_context(|| format!("service `{}`", service.name))?;
		gateway.register(&service.name, Arc::new(provider));
		info!(target = "verifyd", service = %service.name, url_template = %service.value, "service registered");
	}

	let sweeper = registry.spawn_sweeper();

	let addr = format!("{}:{}", cli.host, cli.port);
	let listener = TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;
	let served = serve(listener, AppState::new(gateway.clone(), identifier_pattern)).await;

	sweeper.shutdown().await;
	gateway.shutdown().await;
	info!(target = "verifyd", "shutdown complete");

	served.context("http server error")
}

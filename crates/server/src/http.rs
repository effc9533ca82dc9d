//! HTTP routes over [`Gateway`].

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};
use verifyd::{Gateway, Job, JobId, JobStatus, SessionStatus};

use crate::output::{ApiError, ErrorCode, Reply};

#[derive(Clone)]
pub struct AppState {
	pub gateway: Arc<Gateway>,
	pub identifier_pattern: Arc<Regex>,
}

impl AppState {
	pub fn new(gateway: Arc<Gateway>, identifier_pattern: Regex) -> Self {
		Self {
			gateway,
			identifier_pattern: Arc::new(identifier_pattern),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
	pub identifier: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
	pub job_id: JobId,
	pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct Transition {
	pub changed: bool,
	#[serde(flatten)]
	pub session: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct Health {
	pub services: Vec<String>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/{service}/verify", post(verify))
		.route("/{service}/jobs/{id}", get(job_status))
		.route("/{service}/session", get(session_status))
		.route("/{service}/session/start", post(session_start))
		.route("/{service}/session/stop", post(session_stop))
		.with_state(state)
}

async fn health(State(state): State<AppState>) -> Reply<Health> {
	Reply::ok(
		"health",
		Health {
			services: state.gateway.services(),
		},
	)
}

async fn verify(
	State(state): State<AppState>,
	Path(service): Path<String>,
	body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Reply<Accepted>, ApiError> {
	const COMMAND: &str = "verify";
	let Json(body) = body.map_err(|rejection| {
		ApiError::new(
			COMMAND,
			ErrorCode::InvalidInput,
			format!("expected a JSON body with an `identifier` field: {}", rejection.body_text()),
		)
	})?;
	let identifier = body.identifier.trim();
	if identifier.is_empty() {
		return Err(ApiError::new(COMMAND, ErrorCode::InvalidInput, "identifier is required"));
	}
	if !state.identifier_pattern.is_match(identifier) {
		return Err(ApiError::new(
			COMMAND,
			ErrorCode::InvalidInput,
			format!("identifier `{identifier}` is not valid"),
		));
	}

	let job = state
		.gateway
		.submit(&service, identifier)
		.await
		.map_err(|e| ApiError::from_core(COMMAND, e))?;
	debug!(target = "verifyd.http", %service, job_id = %job.id, "verification accepted");

	Ok(Reply::with_status(
		StatusCode::ACCEPTED,
		COMMAND,
		Accepted {
			job_id: job.id,
			status: job.status(),
		},
	))
}

async fn job_status(
	State(state): State<AppState>,
	Path((service, id)): Path<(String, String)>,
) -> Result<Reply<Job>, ApiError> {
	const COMMAND: &str = "job";
	// Unparseable ids cannot name a stored job.
	let id: JobId = id
		.parse()
		.map_err(|_| ApiError::new(COMMAND, ErrorCode::JobNotFound, format!("job {id} not found for service '{service}'")))?;
	let job = state
		.gateway
		.status_of(&service, &id)
		.map_err(|e| ApiError::from_core(COMMAND, e))?;
	Ok(Reply::ok(COMMAND, job))
}

async fn session_status(State(state): State<AppState>, Path(service): Path<String>) -> Result<Reply<SessionStatus>, ApiError> {
	let status = state
		.gateway
		.resource_status(&service)
		.map_err(|e| ApiError::from_core("session", e))?;
	Ok(Reply::ok("session", status))
}

async fn session_start(State(state): State<AppState>, Path(service): Path<String>) -> Result<Reply<Transition>, ApiError> {
	const COMMAND: &str = "session.start";
	let changed = state
		.gateway
		.start_resource(&service)
		.await
		.map_err(|e| ApiError::from_core(COMMAND, e))?;
	let session = state
		.gateway
		.resource_status(&service)
		.map_err(|e| ApiError::from_core(COMMAND, e))?;
	if !changed {
		let message = if session.running {
			format!("session for '{service}' is already running")
		} else {
			format!("session for '{service}' could not be started")
		};
		return Err(ApiError::new(COMMAND, ErrorCode::SessionConflict, message));
	}
	Ok(Reply::ok(COMMAND, Transition { changed, session }))
}

async fn session_stop(State(state): State<AppState>, Path(service): Path<String>) -> Result<Reply<Transition>, ApiError> {
	const COMMAND: &str = "session.stop";
	let changed = state
		.gateway
		.stop_resource(&service)
		.await
		.map_err(|e| ApiError::from_core(COMMAND, e))?;
	if !changed {
		return Err(ApiError::new(
			COMMAND,
			ErrorCode::SessionConflict,
			format!("session for '{service}' is not running"),
		));
	}
	let session = state
		.gateway
		.resource_status(&service)
		.map_err(|e| ApiError::from_core(COMMAND, e))?;
	Ok(Reply::ok(COMMAND, Transition { changed, session }))
}

/// Serves `router(state)` on `listener` until Ctrl+C or SIGTERM.
/// In-flight requests complete before this returns.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
	let addr = listener.local_addr()?;
	info!(target = "verifyd.http", %addr, "listening (Ctrl+C/SIGTERM to stop)");
	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown_signal())
		.await?;
	info!(target = "verifyd.http", "http server stopped");
	Ok(())
}

async fn shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};
		match signal(SignalKind::terminate()) {
			Ok(mut sigterm) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {}
					_ = sigterm.recv() => {}
				}
			}
			Err(err) => {
				tracing::warn!(target = "verifyd.http", error = %err, "cannot listen for SIGTERM; Ctrl+C only");
				let _ = tokio::signal::ctrl_c().await;
			}
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use async_trait::async_trait;
	use axum::body::{Body, to_bytes};
	use axum::http::Request;
	use serde_json::{Value, json};
	use tower::ServiceExt;
	use verifyd::{
		Backoff, ManagerConfig, RegistryConfig, ServiceRegistry, Session, SessionError, SessionProvider, VerificationError,
		Verifier,
	};

	use super::*;
	use crate::cli::DEFAULT_IDENTIFIER_PATTERN;

	struct AlwaysAvailable;

	#[async_trait]
	impl Verifier for AlwaysAvailable {
		async fn check(&self, identifier: &str) -> Result<bool, VerificationError> {
			Ok(!identifier.starts_with("taken"))
		}
	}

	struct StubSession;

	#[async_trait]
	impl Session for StubSession {
		fn describe(&self) -> String {
			"stub".into()
		}

		async fn verifier(&self) -> Result<Arc<dyn Verifier>, SessionError> {
			Ok(Arc::new(AlwaysAvailable))
		}

		async fn close(self: Box<Self>) -> Result<(), SessionError> {
			Ok(())
		}
	}

	#[derive(Default)]
	struct StubProvider {
		fail: bool,
		created: AtomicUsize,
	}

	#[async_trait]
	impl SessionProvider for StubProvider {
		async fn create(&self) -> Result<Box<dyn Session>, SessionError> {
			self.created.fetch_add(1, Ordering::SeqCst);
			if self.fail {
				return Err(SessionError::fatal("no browser"));
			}
			Ok(Box::new(StubSession))
		}
	}

	fn app(provider: Arc<StubProvider>) -> (Router, Arc<Gateway>) {
		let config = ManagerConfig {
			max_retries: 1,
			retry_delay: Duration::from_millis(1),
			creation_backoff: Backoff {
				max_tries: 1,
				base_delay: Duration::from_millis(1),
				max_delay: Duration::from_millis(1),
			},
			job_poll_interval: Duration::from_millis(10),
			idle_poll_interval: Duration::from_millis(50),
			join_timeout: Duration::from_secs(1),
			..Default::default()
		};
		let registry = Arc::new(ServiceRegistry::new(RegistryConfig::default()));
		let gateway = Arc::new(Gateway::new(registry, config));
		gateway.register("google", provider);
		let state = AppState::new(gateway.clone(), Regex::new(DEFAULT_IDENTIFIER_PATTERN).unwrap());
		(router(state), gateway)
	}

	async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let mut request = Request::builder().method(method).uri(uri);
		let body = match body {
			Some(body) => {
				request = request.header("content-type", "application/json");
				Body::from(body.to_string())
			}
			None => Body::empty(),
		};
		send(app, request.body(body).unwrap()).await
	}

	async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, serde_json::from_slice(&bytes).unwrap())
	}

	#[tokio::test]
	async fn verify_then_poll_until_completed() {
		let (app, gateway) = app(Arc::new(StubProvider::default()));

		let (status, body) = call(&app, "POST", "/google/verify", Some(json!({ "identifier": "alice@example.com" }))).await;
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(body["ok"], true);
		assert_eq!(body["data"]["status"], "pending");
		let job_id = body["data"]["jobId"].as_str().unwrap().to_string();

		let mut last = Value::Null;
		for _ in 0..100 {
			let (status, body) = call(&app, "GET", &format!("/google/jobs/{job_id}"), None).await;
			assert_eq!(status, StatusCode::OK);
			last = body;
			if last["data"]["status"] == "completed" {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert_eq!(last["data"]["status"], "completed");
		assert_eq!(last["data"]["result"]["available"], true);
		assert_eq!(last["data"]["result"]["identifier"], "alice@example.com");

		gateway.shutdown().await;
	}

	#[tokio::test]
	async fn invalid_identifier_is_rejected_without_starting() {
		let provider = Arc::new(StubProvider::default());
		let (app, _gateway) = app(provider.clone());

		let (status, body) = call(&app, "POST", "/google/verify", Some(json!({ "identifier": "not-an-email" }))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["ok"], false);
		assert_eq!(body["error"]["code"], "INVALID_INPUT");

		let (status, _) = call(&app, "POST", "/google/verify", Some(json!({ "identifier": "  " }))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(provider.created.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn malformed_verify_bodies_get_the_error_envelope() {
		let provider = Arc::new(StubProvider::default());
		let (app, _gateway) = app(provider.clone());

		let (status, body) = call(&app, "POST", "/google/verify", Some(json!({}))).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["ok"], false);
		assert_eq!(body["command"], "verify");
		assert_eq!(body["error"]["code"], "INVALID_INPUT");

		let request = Request::builder()
			.method("POST")
			.uri("/google/verify")
			.header("content-type", "application/json")
			.body(Body::from("identifier=alice@example.com"))
			.unwrap();
		let (status, body) = send(&app, request).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"]["code"], "INVALID_INPUT");

		let request = Request::builder()
			.method("POST")
			.uri("/google/verify")
			.body(Body::from(r#"{"identifier":"alice@example.com"}"#))
			.unwrap();
		let (status, body) = send(&app, request).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert!(body["timestamp"].is_u64());

		assert_eq!(provider.created.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn unknown_service_and_job_are_404() {
		let (app, _gateway) = app(Arc::new(StubProvider::default()));

		let (status, body) = call(&app, "POST", "/yahoo/verify", Some(json!({ "identifier": "a@b.co" }))).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"]["code"], "UNKNOWN_SERVICE");

		let (status, body) = call(&app, "GET", &format!("/google/jobs/{}", JobId::new()), None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"]["code"], "JOB_NOT_FOUND");

		let (status, _) = call(&app, "GET", "/google/jobs/not-a-uuid", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn failed_auto_start_is_503() {
		let provider = Arc::new(StubProvider {
			fail: true,
			..Default::default()
		});
		let (app, _gateway) = app(provider);

		let (status, body) = call(&app, "POST", "/google/verify", Some(json!({ "identifier": "a@b.co" }))).await;
		assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(body["error"]["code"], "SESSION_START_FAILED");
	}

	#[tokio::test]
	async fn session_start_stop_and_status() {
		let (app, gateway) = app(Arc::new(StubProvider::default()));

		let (status, body) = call(&app, "GET", "/google/session", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"]["running"], false);
		assert_eq!(body["data"]["state"], "stopped");

		let (status, body) = call(&app, "POST", "/google/session/start", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"]["running"], true);
		assert_eq!(body["data"]["changed"], true);

		let (status, body) = call(&app, "POST", "/google/session/start", None).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"]["code"], "SESSION_CONFLICT");

		let (status, body) = call(&app, "POST", "/google/session/stop", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"]["running"], false);

		let (status, _) = call(&app, "POST", "/google/session/stop", None).await;
		assert_eq!(status, StatusCode::CONFLICT);

		gateway.shutdown().await;
	}

	#[tokio::test]
	async fn health_lists_services() {
		let (app, _gateway) = app(Arc::new(StubProvider::default()));
		let (status, body) = call(&app, "GET", "/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["data"]["services"], json!(["google"]));
		assert_eq!(body["command"], "health");
	}
}

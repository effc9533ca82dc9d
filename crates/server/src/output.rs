//! Response envelope shared by every HTTP route.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use verifyd::job::now_ts;

/// The envelope returned by all routes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult<T> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ApiErrorBody>,
	pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
	pub code: ErrorCode,
	pub message: String,
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	InvalidInput,
	UnknownService,
	JobNotFound,
	SessionStartFailed,
	SessionConflict,
	InternalError,
}

impl ErrorCode {
	pub fn status(self) -> StatusCode {
		match self {
			ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
			ErrorCode::UnknownService | ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
			ErrorCode::SessionStartFailed => StatusCode::SERVICE_UNAVAILABLE,
			ErrorCode::SessionConflict => StatusCode::CONFLICT,
			ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::UnknownService => write!(f, "UNKNOWN_SERVICE"),
			ErrorCode::JobNotFound => write!(f, "JOB_NOT_FOUND"),
			ErrorCode::SessionStartFailed => write!(f, "SESSION_START_FAILED"),
			ErrorCode::SessionConflict => write!(f, "SESSION_CONFLICT"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

/// A successful reply with an explicit status code.
pub struct Reply<T> {
	status: StatusCode,
	body: ApiResult<T>,
}

impl<T: Serialize> Reply<T> {
	pub fn ok(command: &str, data: T) -> Self {
		Self::with_status(StatusCode::OK, command, data)
	}

	pub fn with_status(status: StatusCode, command: &str, data: T) -> Self {
		Self {
			status,
			body: ApiResult {
				ok: true,
				command: command.to_string(),
				data: Some(data),
				error: None,
				timestamp: now_ts(),
			},
		}
	}
}

impl<T: Serialize> IntoResponse for Reply<T> {
	fn into_response(self) -> Response {
		(self.status, Json(self.body)).into_response()
	}
}

/// A failed reply; the HTTP status follows the [`ErrorCode`].
#[derive(Debug, Clone)]
pub struct ApiError {
	pub command: String,
	pub code: ErrorCode,
	pub message: String,
}

impl ApiError {
	pub fn new(command: &str, code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			command: command.to_string(),
			code,
			message: message.into(),
		}
	}

	pub fn from_core(command: &str, err: verifyd::Error) -> Self {
		let code = match &err {
			verifyd::Error::UnknownService(_) => ErrorCode::UnknownService,
			verifyd::Error::JobNotFound { .. } => ErrorCode::JobNotFound,
			verifyd::Error::StartFailed(_) => ErrorCode::SessionStartFailed,
		};
		Self::new(command, code, err.to_string())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body: ApiResult<()> = ApiResult {
			ok: false,
			command: self.command,
			data: None,
			error: Some(ApiErrorBody {
				code: self.code,
				message: self.message,
			}),
			timestamp: now_ts(),
		};
		(self.code.status(), Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_envelope_omits_data() {
		let body: ApiResult<()> = ApiResult {
			ok: false,
			command: "verify".into(),
			data: None,
			error: Some(ApiErrorBody {
				code: ErrorCode::JobNotFound,
				message: "gone".into(),
			}),
			timestamp: 1,
		};
		let json = serde_json::to_value(&body).unwrap();
		assert_eq!(json["error"]["code"], "JOB_NOT_FOUND");
		assert!(json.get("data").is_none());
	}

	#[test]
	fn display_matches_wire_code() {
		for code in [
			ErrorCode::InvalidInput,
			ErrorCode::UnknownService,
			ErrorCode::JobNotFound,
			ErrorCode::SessionStartFailed,
			ErrorCode::SessionConflict,
			ErrorCode::InternalError,
		] {
			assert_eq!(serde_json::to_value(code).unwrap(), code.to_string());
		}
	}

	#[test]
	fn core_errors_map_to_statuses() {
		let err = ApiError::from_core("verify", verifyd::Error::StartFailed("google".into()));
		assert_eq!(err.code.status(), StatusCode::SERVICE_UNAVAILABLE);
		let err = ApiError::from_core("verify", verifyd::Error::UnknownService("yahoo".into()));
		assert_eq!(err.code.status(), StatusCode::NOT_FOUND);
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use marshal_github_app::GithubAppError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("bad payload: {0}")]
	BadPayload(String),
	#[error("missing or invalid webhook signature")]
	Unauthorized,
	#[error(transparent)]
	GitHub(#[from] GithubAppError),
}

impl ServerError {
	pub fn status(&self) -> StatusCode {
		match self {
			ServerError::BadPayload(_) => StatusCode::BAD_REQUEST,
			ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
			ServerError::GitHub(e) => match e {
				GithubAppError::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
				GithubAppError::Config(_) | GithubAppError::Jwt(_) => StatusCode::INTERNAL_SERVER_ERROR,
				GithubAppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
				_ => StatusCode::BAD_GATEWAY,
			},
		}
	}
}

// GitHub redelivers webhooks that fail with a 5xx, so remote failures are
// reported as such rather than retried here.
impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!(error = %self, status = status.as_u16(), "Webhook handling failed");
		}
		(status, self.to_string()).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		assert_eq!(
			ServerError::BadPayload("x".into()).status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(ServerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
		assert_eq!(
			ServerError::from(GithubAppError::api_error(500, "boom")).status(),
			StatusCode::BAD_GATEWAY
		);
		assert_eq!(
			ServerError::from(GithubAppError::Authentication("token request failed".into())).status(),
			StatusCode::BAD_GATEWAY
		);
		assert_eq!(
			ServerError::from(GithubAppError::Jwt("bad key".into())).status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
		assert_eq!(
			ServerError::from(GithubAppError::Timeout).status(),
			StatusCode::GATEWAY_TIMEOUT
		);
	}

	#[test]
	fn test_body_carries_message() {
		let response = ServerError::BadPayload("missing repository".into()).into_response();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}
}

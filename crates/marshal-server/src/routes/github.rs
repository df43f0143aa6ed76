// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `POST /github`: GitHub App webhook deliveries.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use marshal_github_app::verify_webhook_signature;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::ServerError;
use crate::pull_requests::{process_pull_request, PullRequestEvent};
use crate::routes::NO_PAYLOAD;
use crate::AppState;

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const PULL_REQUEST_ACTIONS: &[&str] = &["opened", "synchronize", "labeled", "unlabeled"];
const ISSUE_ACTIONS: &[&str] = &["milestoned", "demilestoned"];

pub const NO_INSTALLATION: &str = "No installation key found in payload";
pub const NOT_PULL_REQUEST_EVENT: &str = "Not a pull_request or issues event";

#[instrument(skip(state, headers, body), fields(event = tracing::field::Empty))]
pub async fn github_webhook(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<String, ServerError> {
	if body.is_empty() {
		return Ok(NO_PAYLOAD.to_string());
	}

	verify_signature(&state, &headers, &body)?;

	let payload: Value =
		serde_json::from_slice(&body).map_err(|e| ServerError::BadPayload(e.to_string()))?;

	let Some(installation_id) = payload.pointer("/installation/id").and_then(Value::as_u64) else {
		return Ok(NO_INSTALLATION.to_string());
	};

	let event = headers
		.get(EVENT_HEADER)
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default();
	tracing::Span::current().record("event", event);

	let action = payload
		.get("action")
		.and_then(Value::as_str)
		.unwrap_or_default();

	let (allowed, number_pointer) = match event {
		"pull_request" => (PULL_REQUEST_ACTIONS, "/pull_request/number"),
		"issues" => (ISSUE_ACTIONS, "/issue/number"),
		_ => return Ok(NOT_PULL_REQUEST_EVENT.to_string()),
	};

	if !allowed.iter().any(|allowed| *allowed == action) {
		return Ok(format!("Action '{action}' does not require action"));
	}

	let number = required_u64(&payload, number_pointer)?;

	// Milestone events also fire for plain issues.
	if event == "issues" && payload.pointer("/issue/pull_request").is_none() {
		return Ok(format!("Issue #{number} is not a pull request"));
	}

	let repository = payload
		.pointer("/repository/full_name")
		.and_then(Value::as_str)
		.ok_or_else(|| ServerError::BadPayload("missing repository.full_name".to_string()))?;

	debug!(repository, number, action, installation_id, "Processing pull request event");

	process_pull_request(
		&state,
		PullRequestEvent {
			repository,
			number,
			installation_id,
			action,
			payload: &payload,
		},
	)
	.await
}

/// Deliveries must be signed when a webhook secret is configured.
fn verify_signature(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ServerError> {
	let Some(secret) = state.github.webhook_secret() else {
		return Ok(());
	};

	let signature = headers
		.get(SIGNATURE_HEADER)
		.and_then(|value| value.to_str().ok())
		.ok_or(ServerError::Unauthorized)?;

	verify_webhook_signature(secret, signature, body).map_err(|_| ServerError::Unauthorized)
}

fn required_u64(payload: &Value, pointer: &str) -> Result<u64, ServerError> {
	payload
		.pointer(pointer)
		.and_then(Value::as_u64)
		.ok_or_else(|| ServerError::BadPayload(format!("missing {pointer}")))
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `POST /circleci`: build notifications from CircleCI.
//!
//! These name a repository but no installation, so the installation is
//! resolved through the directory before any handler runs.

use axum::body::Bytes;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::error::ServerError;
use crate::registry::CiContext;
use crate::routes::NO_PAYLOAD;
use crate::AppState;

/// Keys a notification must carry, sorted so the "missing" answer is stable.
const REQUIRED_KEYS: [&str; 5] = ["build_num", "reponame", "status", "username", "vcs_revision"];

pub const FINISHED: &str = "CircleCI webhook finished";

#[derive(Debug, Clone, Deserialize)]
pub struct CircleCiPayload {
	pub vcs_revision: String,
	pub username: String,
	pub reponame: String,
	pub status: String,
	pub build_num: u64,
	/// Everything else CircleCI sent.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl CircleCiPayload {
	/// `owner/name` of the built repository.
	pub fn repository(&self) -> String {
		format!("{}/{}", self.username, self.reponame)
	}
}

#[derive(Deserialize)]
struct Envelope {
	payload: Map<String, Value>,
}

#[instrument(skip(state, body))]
pub async fn circleci_webhook(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<String, ServerError> {
	if body.is_empty() {
		return Ok(NO_PAYLOAD.to_string());
	}

	let Envelope { payload } =
		serde_json::from_slice(&body).map_err(|e| ServerError::BadPayload(e.to_string()))?;

	let missing: Vec<&str> = REQUIRED_KEYS
		.iter()
		.copied()
		.filter(|key| !payload.contains_key(*key))
		.collect();
	if !missing.is_empty() {
		return Ok(format!("Payload missing {}", missing.join(" ")));
	}

	let payload: CircleCiPayload = serde_json::from_value(Value::Object(payload))
		.map_err(|e| ServerError::BadPayload(e.to_string()))?;
	let repository = payload.repository();

	let installation_id = match state.directory.lookup(&repository).await {
		Ok(id) => id,
		Err(e) if e.is_not_found() => {
			info!(%repository, "CircleCI notification for repository without installation");
			return Ok(format!("circleci: Not installed for {repository}"));
		}
		Err(e) => return Err(e.into()),
	};

	let installation = state.github.installation(installation_id);
	let ctx = CiContext {
		installation: &installation,
		repository: &repository,
		payload: &payload,
	};

	for handler in state.registry.ci_handlers() {
		debug!(handler = handler.name(), build_num = payload.build_num, "Running CI handler");
		handler.handle(&ctx).await?;
	}

	Ok(FINISHED.to_string())
}

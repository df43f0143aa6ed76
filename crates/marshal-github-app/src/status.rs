// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Commit statuses (the pre-checks API, still used by some CI systems).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::InstallationClient;
use crate::error::GithubAppError;
use crate::pagination::decode_items;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
	Pending,
	Success,
	Error,
	Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRequest {
	pub state: StatusState,
	pub context: String,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target_url: Option<String>,
}

impl StatusRequest {
	pub fn new(state: StatusState, context: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			state,
			context: context.into(),
			description: description.into(),
			target_url: None,
		}
	}

	pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
		self.target_url = Some(url.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitStatus {
	pub id: u64,
	pub state: StatusState,
	pub context: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub target_url: Option<String>,
}

impl InstallationClient {
	#[instrument(skip(self, request), fields(context = %request.context))]
	pub async fn set_status(
		&self,
		repository: &str,
		sha: &str,
		request: &StatusRequest,
	) -> Result<(), GithubAppError> {
		self
			.post_json(&format!("repos/{repository}/statuses/{sha}"), request)
			.await?;
		Ok(())
	}

	/// Latest status per context. GitHub lists newest first.
	#[instrument(skip(self))]
	pub async fn list_statuses(
		&self,
		repository: &str,
		sha: &str,
	) -> Result<BTreeMap<String, CommitStatus>, GithubAppError> {
		let items = self
			.get_all(&format!("repos/{repository}/commits/{sha}/statuses"))
			.await?;
		let statuses: Vec<CommitStatus> = decode_items(items)?;

		let mut latest = BTreeMap::new();
		for status in statuses {
			latest.entry(status.context.clone()).or_insert(status);
		}
		Ok(latest)
	}
}

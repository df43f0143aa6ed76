// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Check-run records, desired results and the remote check-run API.

use std::collections::btree_map;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::client::InstallationClient;
use crate::error::GithubAppError;
use crate::pagination::decode_items;

/// Final state of a completed check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
	Success,
	Failure,
	Neutral,
	Cancelled,
	TimedOut,
	ActionRequired,
	/// Conclusions we never write ourselves, such as `skipped` or `stale`.
	#[serde(other)]
	Other,
}

impl CheckConclusion {
	/// The conclusion as sent to GitHub. `Other` only ever comes back from
	/// the API and is rejected on write, so it goes out as `Neutral`.
	pub fn writable(self) -> Self {
		match self {
			Self::Other => Self::Neutral,
			conclusion => conclusion,
		}
	}
}

/// What a check wants the commit to show for one `external_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredCheckResult {
	pub external_id: String,
	/// Display name; defaults to `"{bot}:{external_id}"` on create.
	pub name: Option<String>,
	pub title: String,
	pub summary: String,
	pub text: Option<String>,
	pub conclusion: CheckConclusion,
	pub details_url: Option<String>,
	/// Only update an existing record; never create one.
	pub skip_if_missing: bool,
}

impl DesiredCheckResult {
	pub fn new(
		external_id: impl Into<String>,
		conclusion: CheckConclusion,
		title: impl Into<String>,
	) -> Self {
		Self {
			external_id: external_id.into(),
			name: None,
			title: title.into(),
			summary: String::new(),
			text: None,
			conclusion,
			details_url: None,
			skip_if_missing: false,
		}
	}

	pub fn success(external_id: impl Into<String>, title: impl Into<String>) -> Self {
		Self::new(external_id, CheckConclusion::Success, title)
	}

	pub fn failure(external_id: impl Into<String>, title: impl Into<String>) -> Self {
		Self::new(external_id, CheckConclusion::Failure, title)
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
		self.summary = summary.into();
		self
	}

	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.text = Some(text.into());
		self
	}

	pub fn with_details_url(mut self, url: impl Into<String>) -> Self {
		self.details_url = Some(url.into());
		self
	}

	pub fn skip_if_missing(mut self) -> Self {
		self.skip_if_missing = true;
		self
	}
}

/// Desired results keyed by `external_id`, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredChecks(BTreeMap<String, DesiredCheckResult>);

impl DesiredChecks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a result, returning the one it replaced.
	pub fn insert(&mut self, result: DesiredCheckResult) -> Option<DesiredCheckResult> {
		self.0.insert(result.external_id.clone(), result)
	}

	/// Move every result from `other` in; `other` wins on collisions.
	/// Returns the colliding external ids.
	pub fn merge(&mut self, other: DesiredChecks) -> Vec<String> {
		let mut collisions = Vec::new();
		for (external_id, result) in other.0 {
			if self.0.insert(external_id.clone(), result).is_some() {
				collisions.push(external_id);
			}
		}
		collisions
	}

	pub fn get(&self, external_id: &str) -> Option<&DesiredCheckResult> {
		self.0.get(external_id)
	}

	pub fn contains(&self, external_id: &str) -> bool {
		self.0.contains_key(external_id)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn iter(&self) -> btree_map::Values<'_, String, DesiredCheckResult> {
		self.0.values()
	}
}

impl FromIterator<DesiredCheckResult> for DesiredChecks {
	fn from_iter<I: IntoIterator<Item = DesiredCheckResult>>(iter: I) -> Self {
		let mut checks = Self::new();
		for result in iter {
			checks.insert(result);
		}
		checks
	}
}

impl<'a> IntoIterator for &'a DesiredChecks {
	type Item = &'a DesiredCheckResult;
	type IntoIter = btree_map::Values<'a, String, DesiredCheckResult>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

/// A check run as it exists on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingCheckRecord {
	pub check_id: u64,
	pub external_id: String,
	pub name: String,
	pub head_sha: String,
	pub status: String,
	pub conclusion: Option<CheckConclusion>,
	pub title: Option<String>,
	pub summary: Option<String>,
	pub text: Option<String>,
	pub details_url: Option<String>,
	/// Id of the app that created the record.
	pub app_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CheckRunWire {
	id: u64,
	#[serde(default)]
	external_id: Option<String>,
	name: String,
	head_sha: String,
	status: String,
	#[serde(default)]
	conclusion: Option<CheckConclusion>,
	#[serde(default)]
	details_url: Option<String>,
	#[serde(default)]
	output: Option<CheckOutputWire>,
	#[serde(default)]
	app: Option<AppRefWire>,
}

#[derive(Debug, Deserialize)]
struct CheckOutputWire {
	#[serde(default)]
	title: Option<String>,
	#[serde(default)]
	summary: Option<String>,
	#[serde(default)]
	text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppRefWire {
	id: u64,
}

impl From<CheckRunWire> for ExistingCheckRecord {
	fn from(wire: CheckRunWire) -> Self {
		let output = wire.output.unwrap_or(CheckOutputWire {
			title: None,
			summary: None,
			text: None,
		});
		Self {
			check_id: wire.id,
			external_id: wire.external_id.unwrap_or_default(),
			name: wire.name,
			head_sha: wire.head_sha,
			status: wire.status,
			conclusion: wire.conclusion,
			title: output.title,
			summary: output.summary,
			text: output.text,
			details_url: wire.details_url,
			app_id: wire.app.map(|app| app.id),
		}
	}
}

/// Body of a check-run create or update. Always a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRunRequest {
	pub name: String,
	pub head_sha: String,
	pub external_id: String,
	pub status: &'static str,
	pub conclusion: CheckConclusion,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details_url: Option<String>,
	pub output: CheckRunOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRunOutput {
	pub title: String,
	pub summary: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
}

pub(crate) const STATUS_COMPLETED: &str = "completed";

/// The three remote operations reconciliation needs.
#[async_trait]
pub trait CheckRunApi: Send + Sync {
	/// Every check run on `head_sha`, from any app.
	async fn list_check_runs(
		&self,
		repository: &str,
		head_sha: &str,
	) -> Result<Vec<ExistingCheckRecord>, GithubAppError>;

	/// Create a check run and return its id.
	async fn create_check_run(
		&self,
		repository: &str,
		request: &CheckRunRequest,
	) -> Result<u64, GithubAppError>;

	async fn update_check_run(
		&self,
		repository: &str,
		check_id: u64,
		request: &CheckRunRequest,
	) -> Result<(), GithubAppError>;
}

#[async_trait]
impl CheckRunApi for InstallationClient {
	#[instrument(skip(self))]
	async fn list_check_runs(
		&self,
		repository: &str,
		head_sha: &str,
	) -> Result<Vec<ExistingCheckRecord>, GithubAppError> {
		let items = self
			.get_all_in(
				&format!("repos/{repository}/commits/{head_sha}/check-runs"),
				"check_runs",
			)
			.await?;
		let runs: Vec<CheckRunWire> = decode_items(items)?;
		Ok(runs.into_iter().map(ExistingCheckRecord::from).collect())
	}

	#[instrument(skip(self, request), fields(external_id = %request.external_id))]
	async fn create_check_run(
		&self,
		repository: &str,
		request: &CheckRunRequest,
	) -> Result<u64, GithubAppError> {
		let created = self
			.post_json(&format!("repos/{repository}/check-runs"), request)
			.await?;
		created
			.get("id")
			.and_then(Value::as_u64)
			.ok_or_else(|| GithubAppError::InvalidResponse("check run without id".to_string()))
	}

	#[instrument(skip(self, request), fields(external_id = %request.external_id))]
	async fn update_check_run(
		&self,
		repository: &str,
		check_id: u64,
		request: &CheckRunRequest,
	) -> Result<(), GithubAppError> {
		self
			.patch_json(&format!("repos/{repository}/check-runs/{check_id}"), request)
			.await?;
		Ok(())
	}
}

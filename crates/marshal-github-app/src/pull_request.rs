// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Pull request handles.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::checks::{DesiredCheckResult, DesiredChecks};
use crate::client::InstallationClient;
use crate::error::GithubAppError;
use crate::issue::{milestone_title, IssueHandle, RemoteObject};
use crate::pagination::decode_items;
use crate::reconcile::{ReconcileSummary, Reconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
	Approve,
	RequestChanges,
	Comment,
}

#[derive(Debug, serde::Deserialize)]
struct FileWire {
	filename: String,
}

/// A pull request. Issue operations (labels, comments) go through
/// [`PullRequestHandle::issue`].
pub struct PullRequestHandle {
	issue: IssueHandle,
	cached: OnceCell<Value>,
}

#[async_trait]
impl RemoteObject for PullRequestHandle {
	fn client(&self) -> &InstallationClient {
		self.issue.client()
	}

	fn api_path(&self) -> String {
		format!("repos/{}/pulls/{}", self.issue.repository(), self.issue.number())
	}

	fn cache(&self) -> &OnceCell<Value> {
		&self.cached
	}
}

impl PullRequestHandle {
	pub fn new(client: InstallationClient, repository: impl Into<String>, number: u64) -> Self {
		Self {
			issue: IssueHandle::new(client, repository, number),
			cached: OnceCell::new(),
		}
	}

	pub fn issue(&self) -> &IssueHandle {
		&self.issue
	}

	pub fn issue_mut(&mut self) -> &mut IssueHandle {
		&mut self.issue
	}

	pub fn repository(&self) -> &str {
		self.issue.repository()
	}

	pub fn number(&self) -> u64 {
		self.issue.number()
	}

	pub fn invalidate(&mut self) {
		self.cached.take();
		self.issue.invalidate();
	}

	async fn field(&self, pointer: &str) -> Result<String, GithubAppError> {
		self
			.json()
			.await?
			.pointer(pointer)
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| {
				GithubAppError::InvalidResponse(format!("pull request without {pointer}"))
			})
	}

	pub async fn head_sha(&self) -> Result<String, GithubAppError> {
		self.field("/head/sha").await
	}

	pub async fn base_sha(&self) -> Result<String, GithubAppError> {
		self.field("/base/sha").await
	}

	pub async fn head_branch(&self) -> Result<String, GithubAppError> {
		self.field("/head/ref").await
	}

	pub async fn base_branch(&self) -> Result<String, GithubAppError> {
		self.field("/base/ref").await
	}

	/// Full name of the repository the head branch lives in (forks differ).
	pub async fn head_repo_name(&self) -> Result<String, GithubAppError> {
		self.field("/head/repo/full_name").await
	}

	pub async fn user(&self) -> Result<String, GithubAppError> {
		self.field("/user/login").await
	}

	pub async fn is_closed(&self) -> Result<bool, GithubAppError> {
		Ok(self.json().await?.get("state").and_then(Value::as_str) == Some("closed"))
	}

	pub async fn draft(&self) -> Result<bool, GithubAppError> {
		Ok(self
			.json()
			.await?
			.get("draft")
			.and_then(Value::as_bool)
			.unwrap_or(false))
	}

	pub async fn milestone(&self) -> Result<Option<String>, GithubAppError> {
		Ok(milestone_title(self.json().await?))
	}

	/// Paths touched by the pull request.
	pub async fn modified_files(&self) -> Result<Vec<String>, GithubAppError> {
		let items = self
			.client()
			.get_all(&format!("{}/files", self.api_path()))
			.await?;
		let files: Vec<FileWire> = decode_items(items)?;
		Ok(files.into_iter().map(|file| file.filename).collect())
	}

	/// True if any of `paths` is among the modified files.
	pub async fn has_modified(&self, paths: &[&str]) -> Result<bool, GithubAppError> {
		let files = self.modified_files().await?;
		Ok(files.iter().any(|file| paths.contains(&file.as_str())))
	}

	/// Submit a review against the current head commit.
	#[instrument(skip(self, body), fields(repository = %self.repository(), number = self.number()))]
	pub async fn submit_review(&self, event: ReviewEvent, body: &str) -> Result<(), GithubAppError> {
		let head_sha = self.head_sha().await?;
		self
			.client()
			.post_json(
				&format!("{}/reviews", self.api_path()),
				&json!({ "commit_id": head_sha, "body": body, "event": event }),
			)
			.await?;
		Ok(())
	}

	/// Set one check on the head commit, outside reconciliation. Our
	/// existing record for the same external id is updated in place.
	pub async fn upsert_check(
		&self,
		reconciler: &Reconciler,
		result: &DesiredCheckResult,
	) -> Result<ReconcileSummary, GithubAppError> {
		let head_sha = self.head_sha().await?;
		reconciler
			.upsert(self.client(), self.repository(), &head_sha, result)
			.await
	}

	/// Reconcile our check runs on the head commit against `desired`.
	pub async fn reconcile_checks(
		&self,
		reconciler: &Reconciler,
		desired: &DesiredChecks,
	) -> Result<ReconcileSummary, GithubAppError> {
		let head_sha = self.head_sha().await?;
		reconciler
			.reconcile(self.client(), self.repository(), &head_sha, desired)
			.await
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Issue handles: lazily fetched issue state plus labels and comments.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::client::InstallationClient;
use crate::error::GithubAppError;
use crate::pagination::decode_items;

/// A remote object fetched on first access and cached for the handle's life.
#[async_trait]
pub trait RemoteObject: Send + Sync {
	fn client(&self) -> &InstallationClient;

	/// API path of the object, e.g. `repos/acme/widgets/issues/12`.
	fn api_path(&self) -> String;

	fn cache(&self) -> &OnceCell<Value>;

	/// The object's JSON, fetched at most once.
	async fn json(&self) -> Result<&Value, GithubAppError> {
		self
			.cache()
			.get_or_try_init(|| async move {
				let path = self.api_path();
				self.client().get_json(&path).await
			})
			.await
	}
}

/// Decides which comments a search keeps, by body.
pub trait CommentFilter: Send + Sync {
	fn keep(&self, body: &str) -> bool;
}

impl<F> CommentFilter for F
where
	F: Fn(&str) -> bool + Send + Sync,
{
	fn keep(&self, body: &str) -> bool {
		self(body)
	}
}

/// Keeps every comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl CommentFilter for KeepAll {
	fn keep(&self, _body: &str) -> bool {
		true
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentAuthor {
	pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
	pub id: u64,
	#[serde(default)]
	pub body: String,
	#[serde(default)]
	pub user: Option<CommentAuthor>,
	pub created_at: DateTime<Utc>,
	pub html_url: String,
}

impl IssueComment {
	fn is_by(&self, login: &str) -> bool {
		self.user.as_ref().is_some_and(|user| user.login == login)
	}
}

#[derive(Debug, Deserialize)]
struct LabelWire {
	name: String,
}

/// An issue (or the issue side of a pull request).
pub struct IssueHandle {
	client: InstallationClient,
	repository: String,
	number: u64,
	cached: OnceCell<Value>,
}

#[async_trait]
impl RemoteObject for IssueHandle {
	fn client(&self) -> &InstallationClient {
		&self.client
	}

	fn api_path(&self) -> String {
		format!("repos/{}/issues/{}", self.repository, self.number)
	}

	fn cache(&self) -> &OnceCell<Value> {
		&self.cached
	}
}

impl IssueHandle {
	pub fn new(client: InstallationClient, repository: impl Into<String>, number: u64) -> Self {
		Self {
			client,
			repository: repository.into(),
			number,
			cached: OnceCell::new(),
		}
	}

	pub fn repository(&self) -> &str {
		&self.repository
	}

	pub fn number(&self) -> u64 {
		self.number
	}

	/// Forget the cached JSON so the next read refetches.
	pub fn invalidate(&mut self) {
		self.cached.take();
	}

	/// The login our own comments are posted under.
	pub fn bot_login(&self) -> String {
		format!("{}[bot]", self.client.app().app_slug())
	}

	pub async fn is_closed(&self) -> Result<bool, GithubAppError> {
		Ok(self.json().await?.get("state").and_then(Value::as_str) == Some("closed"))
	}

	pub async fn title(&self) -> Result<String, GithubAppError> {
		Ok(self
			.json()
			.await?
			.get("title")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string())
	}

	/// Milestone title, if one is set.
	pub async fn milestone(&self) -> Result<Option<String>, GithubAppError> {
		Ok(milestone_title(self.json().await?))
	}

	/// Current label names.
	pub async fn labels(&self) -> Result<Vec<String>, GithubAppError> {
		let items = self.client.get_all(&format!("{}/labels", self.api_path())).await?;
		let labels: Vec<LabelWire> = decode_items(items)?;
		Ok(labels.into_iter().map(|label| label.name).collect())
	}

	/// Ensure every label in `wanted` is present.
	///
	/// Labels the repository does not define are skipped with a warning
	/// rather than created. Returns the labels actually added.
	#[instrument(skip(self), fields(repository = %self.repository, number = self.number))]
	pub async fn set_labels(&self, wanted: &[&str]) -> Result<Vec<String>, GithubAppError> {
		let current: BTreeSet<String> = self.labels().await?.into_iter().collect();
		let missing: BTreeSet<&str> = wanted
			.iter()
			.copied()
			.filter(|label| !current.contains(*label))
			.collect();
		if missing.is_empty() {
			return Ok(Vec::new());
		}

		let items = self
			.client
			.get_all(&format!("repos/{}/labels", self.repository))
			.await?;
		let defined: BTreeSet<String> = decode_items::<LabelWire>(items)?
			.into_iter()
			.map(|label| label.name)
			.collect();

		let (to_add, undefined): (Vec<&str>, Vec<&str>) =
			missing.into_iter().partition(|label| defined.contains(*label));
		if !undefined.is_empty() {
			warn!(labels = ?undefined, "Labels not defined in repository, skipping");
		}
		if to_add.is_empty() {
			return Ok(Vec::new());
		}

		self
			.client
			.post_json(&format!("{}/labels", self.api_path()), &json!({ "labels": to_add }))
			.await?;
		debug!(labels = ?to_add, "Added labels");
		Ok(to_add.into_iter().map(str::to_string).collect())
	}

	/// Post a new comment, or edit `existing` in place.
	#[instrument(skip(self, body), fields(repository = %self.repository, number = self.number))]
	pub async fn submit_comment(
		&self,
		body: &str,
		existing: Option<u64>,
	) -> Result<IssueComment, GithubAppError> {
		let payload = json!({ "body": body });
		let response = match existing {
			Some(comment_id) => {
				self
					.client
					.patch_json(
						&format!("repos/{}/issues/comments/{comment_id}", self.repository),
						&payload,
					)
					.await?
			}
			None => {
				self
					.client
					.post_json(&format!("{}/comments", self.api_path()), &payload)
					.await?
			}
		};
		serde_json::from_value(response)
			.map_err(|e| GithubAppError::InvalidResponse(format!("JSON parse error: {e}")))
	}

	/// Comments by `login` whose body passes `filter`, oldest first.
	pub async fn comments_by(
		&self,
		login: &str,
		filter: &dyn CommentFilter,
	) -> Result<Vec<IssueComment>, GithubAppError> {
		let items = self.client.get_all(&format!("{}/comments", self.api_path())).await?;
		let comments: Vec<IssueComment> = decode_items(items)?;
		Ok(comments
			.into_iter()
			.filter(|comment| comment.is_by(login) && filter.keep(&comment.body))
			.collect())
	}

	/// Ids of matching comments by `login`.
	pub async fn find_comments(
		&self,
		login: &str,
		filter: &dyn CommentFilter,
	) -> Result<Vec<u64>, GithubAppError> {
		Ok(self
			.comments_by(login, filter)
			.await?
			.into_iter()
			.map(|comment| comment.id)
			.collect())
	}

	/// When `login` last left a matching comment.
	pub async fn last_comment_date(
		&self,
		login: &str,
		filter: &dyn CommentFilter,
	) -> Result<Option<DateTime<Utc>>, GithubAppError> {
		Ok(self
			.comments_by(login, filter)
			.await?
			.into_iter()
			.map(|comment| comment.created_at)
			.max())
	}

	pub async fn close(&mut self) -> Result<(), GithubAppError> {
		self
			.client
			.patch_json(&self.api_path(), &json!({ "state": "closed" }))
			.await?;
		self.invalidate();
		Ok(())
	}
}

pub(crate) fn milestone_title(value: &Value) -> Option<String> {
	value
		.pointer("/milestone/title")
		.and_then(Value::as_str)
		.map(str::to_string)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{test_client, token_body};
	use wiremock::matchers::{body_json, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const ISSUE: &str = "/repos/acme/widgets/issues/12";

	async fn server_with_token() -> MockServer {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/app/installations/1/access_tokens"))
			.respond_with(ResponseTemplate::new(201).set_body_json(token_body("ghs_1")))
			.mount(&server)
			.await;
		server
	}

	fn issue(server: &MockServer) -> IssueHandle {
		IssueHandle::new(test_client(server).installation(1), "acme/widgets", 12)
	}

	fn comment(id: u64, login: &str, body: &str, created_at: &str) -> Value {
		json!({
			"id": id,
			"body": body,
			"user": {"login": login},
			"created_at": created_at,
			"html_url": format!("https://github.com/acme/widgets/issues/12#issuecomment-{id}"),
		})
	}

	#[test]
	fn test_closure_filter_and_keep_all() {
		let mentions_ci = |body: &str| body.contains("CI");
		assert!(mentions_ci.keep("CI is red"));
		assert!(!mentions_ci.keep("hello"));
		assert!(KeepAll.keep("anything"));
	}

	#[tokio::test]
	async fn test_json_is_fetched_once_until_invalidated() {
		let server = server_with_token().await;
		Mock::given(method("GET"))
			.and(path(ISSUE))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"state": "open",
				"title": "Widgets wobble",
				"milestone": {"title": "v1.0"},
			})))
			.expect(2)
			.mount(&server)
			.await;

		let mut handle = issue(&server);
		assert!(!handle.is_closed().await.unwrap());
		assert_eq!(handle.title().await.unwrap(), "Widgets wobble");
		assert_eq!(handle.milestone().await.unwrap().as_deref(), Some("v1.0"));

		handle.invalidate();
		assert!(!handle.is_closed().await.unwrap());
	}

	#[tokio::test]
	async fn test_set_labels_adds_only_defined_missing_labels() {
		let server = server_with_token().await;
		Mock::given(method("GET"))
			.and(path(format!("{ISSUE}/labels")))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "bug"}])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/repos/acme/widgets/labels"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!([{"name": "bug"}, {"name": "triage"}])),
			)
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path(format!("{ISSUE}/labels")))
			.and(body_json(json!({"labels": ["triage"]})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
			.expect(1)
			.mount(&server)
			.await;

		let added = issue(&server)
			.set_labels(&["bug", "triage", "no-such-label"])
			.await
			.unwrap();
		assert_eq!(added, vec!["triage".to_string()]);
	}

	#[tokio::test]
	async fn test_set_labels_noop_when_present() {
		let server = server_with_token().await;
		Mock::given(method("GET"))
			.and(path(format!("{ISSUE}/labels")))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "bug"}])))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/repos/acme/widgets/labels"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
			.expect(0)
			.mount(&server)
			.await;

		assert!(issue(&server).set_labels(&["bug"]).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_comment_search_by_login_and_filter() {
		let server = server_with_token().await;
		Mock::given(method("GET"))
			.and(path(format!("{ISSUE}/comments")))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				comment(1, "marshal[bot]", "CI failed", "2024-03-01T10:00:00Z"),
				comment(2, "someone", "CI failed", "2024-03-02T10:00:00Z"),
				comment(3, "marshal[bot]", "Thanks!", "2024-03-03T10:00:00Z"),
				comment(4, "marshal[bot]", "CI passed", "2024-03-04T10:00:00Z"),
			])))
			.mount(&server)
			.await;

		let handle = issue(&server);
		let login = handle.bot_login();
		assert_eq!(login, "marshal[bot]");

		let about_ci = |body: &str| body.starts_with("CI");
		assert_eq!(handle.find_comments(&login, &about_ci).await.unwrap(), vec![1, 4]);
		assert_eq!(handle.find_comments(&login, &KeepAll).await.unwrap(), vec![1, 3, 4]);

		let last = handle.last_comment_date(&login, &about_ci).await.unwrap().unwrap();
		assert_eq!(last.to_rfc3339(), "2024-03-04T10:00:00+00:00");

		let none = |_: &str| false;
		assert!(handle.last_comment_date(&login, &none).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_submit_comment_creates_or_edits() {
		let server = server_with_token().await;
		Mock::given(method("POST"))
			.and(path(format!("{ISSUE}/comments")))
			.and(body_json(json!({"body": "hello"})))
			.respond_with(ResponseTemplate::new(201).set_body_json(comment(
				77,
				"marshal[bot]",
				"hello",
				"2024-03-01T10:00:00Z",
			)))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("PATCH"))
			.and(path("/repos/acme/widgets/issues/comments/77"))
			.and(body_json(json!({"body": "edited"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(comment(
				77,
				"marshal[bot]",
				"edited",
				"2024-03-01T10:00:00Z",
			)))
			.expect(1)
			.mount(&server)
			.await;

		let handle = issue(&server);
		let created = handle.submit_comment("hello", None).await.unwrap();
		assert_eq!(created.id, 77);
		assert!(created.html_url.ends_with("#issuecomment-77"));

		let edited = handle.submit_comment("edited", Some(77)).await.unwrap();
		assert_eq!(edited.body, "edited");
	}

	#[tokio::test]
	async fn test_close_patches_state_and_refetches() {
		let server = server_with_token().await;
		Mock::given(method("PATCH"))
			.and(path(ISSUE))
			.and(body_json(json!({"state": "closed"})))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "closed"})))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path(ISSUE))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "closed"})))
			.expect(1)
			.mount(&server)
			.await;

		let mut handle = issue(&server);
		handle.close().await.unwrap();
		assert!(handle.is_closed().await.unwrap());
	}
}

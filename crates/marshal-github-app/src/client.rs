// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App client: app JWTs, cached installation tokens, and the
//! installation-scoped request helpers everything else is built on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use marshal_common_config::{Secret, SecretString};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::config::GithubAppConfig;
use crate::error::{map_send_error, GithubAppError, TOKEN_REQUEST_FAILED};
use crate::jwt::{AppAssertion, AppTokenIssuer};
use crate::pagination::{decode_items, fetch_all};
use crate::reconcile::Reconciler;
use crate::types::{
	AccessTokenResponse, AppInfo, GitHubErrorResponse, Installation, InstallationRepository,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";
const API_VERSION_HEADER: HeaderName = HeaderName::from_static("x-github-api-version");

/// Cached installation token with expiration tracking.
struct CachedToken {
	token: SecretString,
	expires_at: DateTime<Utc>,
}

impl CachedToken {
	fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
		now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
	}
}

/// Client for the GitHub App API.
///
/// Cheap to clone; clones share the JWT issuer and the installation token
/// cache. Nothing here retries: the first failing request ends the operation.
#[derive(Clone)]
pub struct GithubAppClient {
	http_client: Client,
	config: GithubAppConfig,
	issuer: Arc<AppTokenIssuer>,
	/// Cached installation tokens keyed by installation id
	installation_token_cache: Arc<Mutex<HashMap<u64, CachedToken>>>,
	/// Locks for serializing per-installation token fetches
	installation_locks: Arc<Mutex<HashMap<u64, Arc<Mutex<()>>>>>,
}

impl GithubAppClient {
	/// Create a new GitHub App client.
	///
	/// The private key is not parsed here; a bad key fails the first request.
	pub fn new(config: GithubAppConfig) -> Result<Self, GithubAppError> {
		let http_client = marshal_common_http::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| GithubAppError::Config(format!("Failed to create HTTP client: {e}")))?;

		info!(
			app_id = config.app_id(),
			base_url = %config.base_url(),
			"Created GitHub App client"
		);

		let issuer = AppTokenIssuer::new(
			config.app_id(),
			Secret::new(config.private_key_pem().to_string()),
		);

		Ok(Self {
			http_client,
			config,
			issuer: Arc::new(issuer),
			installation_token_cache: Arc::new(Mutex::new(HashMap::new())),
			installation_locks: Arc::new(Mutex::new(HashMap::new())),
		})
	}

	pub fn config(&self) -> &GithubAppConfig {
		&self.config
	}

	pub fn app_id(&self) -> u64 {
		self.config.app_id()
	}

	/// Bot name used in default check-run names.
	pub fn app_slug(&self) -> &str {
		self.config.app_slug()
	}

	/// Get the webhook secret, if configured.
	pub fn webhook_secret(&self) -> Option<&str> {
		self.config.webhook_secret()
	}

	pub(crate) fn http(&self) -> &Client {
		&self.http_client
	}

	/// Resolve a path like `repos/o/r/issues/1` against the API base URL.
	pub fn api_url(&self, path: &str) -> Result<Url, GithubAppError> {
		self
			.config
			.base_url()
			.join(path.trim_start_matches('/'))
			.map_err(|e| GithubAppError::Config(format!("Invalid URL for '{path}': {e}")))
	}

	/// A signed app assertion with more than a minute of life left.
	pub async fn app_assertion(&self) -> Result<AppAssertion, GithubAppError> {
		self.issuer.assertion().await
	}

	/// Headers authenticating as the app itself (JWT bearer).
	pub async fn app_headers(&self) -> Result<HeaderMap, GithubAppError> {
		let assertion = self.issuer.assertion().await?;
		auth_headers(assertion.token())
	}

	/// Headers authenticating as an installation.
	pub async fn build_auth_headers(&self, installation_id: u64) -> Result<HeaderMap, GithubAppError> {
		let token = self.installation_token(installation_id).await?;
		auth_headers(&token)
	}

	/// Request helpers scoped to one installation.
	pub fn installation(&self, installation_id: u64) -> InstallationClient {
		InstallationClient {
			app: self.clone(),
			installation_id,
		}
	}

	/// Reconciler bound to this app's id and bot name.
	pub fn reconciler(&self) -> Reconciler {
		Reconciler::new(self.app_id(), self.app_slug())
	}

	async fn get_installation_lock(&self, installation_id: u64) -> Arc<Mutex<()>> {
		let mut locks = self.installation_locks.lock().await;
		locks
			.entry(installation_id)
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	async fn cached_installation_token(&self, installation_id: u64) -> Option<String> {
		let cache = self.installation_token_cache.lock().await;
		cache
			.get(&installation_id)
			.filter(|cached| cached.is_fresh_at(Utc::now()))
			.map(|cached| cached.token.expose().clone())
	}

	/// Get or refresh an installation access token.
	///
	/// Tokens are reused until they are within a minute of expiry. Fetches are
	/// serialized per installation, so concurrent callers share one request.
	#[instrument(skip(self))]
	pub async fn installation_token(&self, installation_id: u64) -> Result<String, GithubAppError> {
		if let Some(token) = self.cached_installation_token(installation_id).await {
			trace!(installation_id, "Using cached installation token");
			return Ok(token);
		}

		let lock = self.get_installation_lock(installation_id).await;
		let _guard = lock.lock().await;

		if let Some(token) = self.cached_installation_token(installation_id).await {
			trace!(installation_id, "Using cached installation token (post-lock)");
			return Ok(token);
		}

		debug!(installation_id, "Fetching new installation token");
		let fresh = self.fetch_installation_token(installation_id).await?;
		let cached = CachedToken {
			token: Secret::new(fresh.token.clone()),
			expires_at: fresh.expires_at,
		};

		// A caller must never be handed a token inside the refresh margin.
		if !cached.is_fresh_at(Utc::now()) {
			warn!(installation_id, expires_at = %fresh.expires_at, "Token endpoint returned a token about to expire");
			return Err(GithubAppError::InvalidResponse(format!(
				"installation token expires too soon ({})",
				fresh.expires_at
			)));
		}

		let mut cache = self.installation_token_cache.lock().await;
		cache.insert(installation_id, cached);

		info!(installation_id, expires_at = %fresh.expires_at, "Installation token refreshed");
		Ok(fresh.token)
	}

	async fn fetch_installation_token(
		&self,
		installation_id: u64,
	) -> Result<AccessTokenResponse, GithubAppError> {
		let headers = self.app_headers().await?;
		let url = self.api_url(&format!(
			"app/installations/{installation_id}/access_tokens"
		))?;

		let response = self
			.http_client
			.post(url)
			.headers(headers)
			.send()
			.await
			.map_err(|e| {
				error!(error = %e, installation_id, "Installation token request failed");
				map_send_error(e)
			})?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			if status == StatusCode::UNAUTHORIZED {
				self.issuer.invalidate().await;
			}
			return Err(map_token_error(status, &body));
		}

		response.json().await.map_err(|e| {
			error!(error = %e, "Failed to parse access token response");
			GithubAppError::InvalidResponse(format!("JSON parse error: {e}"))
		})
	}

	/// Fetch every page of `url` as a flat list; each page is a JSON array.
	pub async fn get_all(&self, url: Url, headers: &HeaderMap) -> Result<Vec<Value>, GithubAppError> {
		fetch_all(&self.http_client, url, headers, None).await
	}

	/// Like [`get_all`](Self::get_all) for endpoints wrapping the array in an
	/// object under `field`.
	pub async fn get_all_in(
		&self,
		url: Url,
		headers: &HeaderMap,
		field: &str,
	) -> Result<Vec<Value>, GithubAppError> {
		fetch_all(&self.http_client, url, headers, Some(field)).await
	}

	/// All installations of this app.
	#[instrument(skip(self))]
	pub async fn list_installations(&self) -> Result<Vec<Installation>, GithubAppError> {
		let headers = self.app_headers().await?;
		let items = self.get_all(self.api_url("app/installations")?, &headers).await?;
		decode_items(items)
	}

	/// The app's own record, from `GET /app`.
	#[instrument(skip(self))]
	pub async fn app_info(&self) -> Result<AppInfo, GithubAppError> {
		let headers = self.app_headers().await?;
		let response = send_checked(self.http_client.get(self.api_url("app")?).headers(headers)).await?;
		response
			.json()
			.await
			.map_err(|e| GithubAppError::InvalidResponse(format!("JSON parse error: {e}")))
	}

	/// Get the installation URL for users.
	pub fn installation_url(&self) -> String {
		self.config.installation_url()
	}
}

/// Requests authenticated as one installation.
#[derive(Clone)]
pub struct InstallationClient {
	app: GithubAppClient,
	installation_id: u64,
}

impl std::fmt::Debug for InstallationClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InstallationClient")
			.field("app_id", &self.app.app_id())
			.field("installation_id", &self.installation_id)
			.finish()
	}
}

impl InstallationClient {
	pub fn installation_id(&self) -> u64 {
		self.installation_id
	}

	pub fn app(&self) -> &GithubAppClient {
		&self.app
	}

	pub async fn headers(&self) -> Result<HeaderMap, GithubAppError> {
		self.app.build_auth_headers(self.installation_id).await
	}

	#[instrument(skip(self), fields(installation_id = self.installation_id))]
	pub async fn get_json(&self, path: &str) -> Result<Value, GithubAppError> {
		let request = self.app.http().get(self.app.api_url(path)?);
		self.send_json(request).await
	}

	#[instrument(skip(self, body), fields(installation_id = self.installation_id))]
	pub async fn post_json<B: Serialize + ?Sized + Sync>(
		&self,
		path: &str,
		body: &B,
	) -> Result<Value, GithubAppError> {
		let request = self.app.http().post(self.app.api_url(path)?).json(body);
		self.send_json(request).await
	}

	#[instrument(skip(self, body), fields(installation_id = self.installation_id))]
	pub async fn patch_json<B: Serialize + ?Sized + Sync>(
		&self,
		path: &str,
		body: &B,
	) -> Result<Value, GithubAppError> {
		let request = self.app.http().patch(self.app.api_url(path)?).json(body);
		self.send_json(request).await
	}

	pub async fn get_all(&self, path: &str) -> Result<Vec<Value>, GithubAppError> {
		let headers = self.headers().await?;
		self.app.get_all(self.app.api_url(path)?, &headers).await
	}

	pub async fn get_all_in(&self, path: &str, field: &str) -> Result<Vec<Value>, GithubAppError> {
		let headers = self.headers().await?;
		self.app.get_all_in(self.app.api_url(path)?, &headers, field).await
	}

	/// Repositories this installation can reach.
	#[instrument(skip(self), fields(installation_id = self.installation_id))]
	pub async fn list_repositories(&self) -> Result<Vec<InstallationRepository>, GithubAppError> {
		let items = self.get_all_in("installation/repositories", "repositories").await?;
		decode_items(items)
	}

	async fn send_json(&self, request: RequestBuilder) -> Result<Value, GithubAppError> {
		let headers = self.headers().await?;
		let response = send_checked(request.headers(headers)).await?;
		read_json(response).await
	}
}

/// GitHub's standard request headers around a bearer credential.
pub(crate) fn auth_headers(token: &str) -> Result<HeaderMap, GithubAppError> {
	let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
		.map_err(|_| GithubAppError::InvalidResponse("token is not a valid header value".to_string()))?;
	authorization.set_sensitive(true);

	let mut headers = HeaderMap::new();
	headers.insert(AUTHORIZATION, authorization);
	headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
	headers.insert(API_VERSION_HEADER, HeaderValue::from_static(GITHUB_API_VERSION));
	Ok(headers)
}

/// Send a request, turning transport failures and non-2xx statuses into errors.
pub(crate) async fn send_checked(request: RequestBuilder) -> Result<Response, GithubAppError> {
	let response = request.send().await.map_err(map_send_error)?;
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();
	error!(status = status.as_u16(), body = %body, "GitHub API error");
	Err(GithubAppError::api_error(status.as_u16(), body))
}

/// Empty bodies (204) come back as `Value::Null`.
async fn read_json(response: Response) -> Result<Value, GithubAppError> {
	let bytes = response.bytes().await.map_err(map_send_error)?;
	if bytes.is_empty() {
		return Ok(Value::Null);
	}
	serde_json::from_slice(&bytes)
		.map_err(|e| GithubAppError::InvalidResponse(format!("JSON parse error: {e}")))
}

/// Token endpoint failures carry GitHub's `message` when there is one.
pub(crate) fn map_token_error(status: StatusCode, body: &str) -> GithubAppError {
	let message = serde_json::from_str::<GitHubErrorResponse>(body)
		.map(|e| e.message)
		.unwrap_or_else(|_| TOKEN_REQUEST_FAILED.to_string());

	warn!(status = status.as_u16(), message = %message, "Installation token request rejected");
	GithubAppError::Authentication(message)
}

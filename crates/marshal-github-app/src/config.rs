// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration for the GitHub App client.

use std::env;
use std::time::Duration;

use marshal_common_config::{load_secret_env, Secret, SecretString};
use url::Url;

use crate::error::GithubAppError;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const DEFAULT_APP_SLUG: &str = "marshal";

/// Default lifetime of the repository → installation directory.
pub const DEFAULT_DIRECTORY_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Configuration for the GitHub App client.
///
/// Sensitive fields (private key, webhook secret) are stored as
/// [`SecretString`] so they never reach the logs. Use `.expose()` to access
/// the actual values.
#[derive(Clone)]
pub struct GithubAppConfig {
	/// GitHub App numeric ID
	app_id: u64,

	/// PEM-encoded RSA private key for JWT signing
	private_key_pem: SecretString,

	/// Secret for webhook signature verification
	webhook_secret: Option<SecretString>,

	/// App slug, doubling as the bot name in default check-run names
	app_slug: String,

	/// Base URL for the GitHub API, always ending in `/`
	base_url: Url,

	/// How long a full directory refresh stays authoritative
	directory_ttl: Duration,
}

impl std::fmt::Debug for GithubAppConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GithubAppConfig")
			.field("app_id", &self.app_id)
			.field("private_key_pem", &self.private_key_pem)
			.field("webhook_secret", &self.webhook_secret)
			.field("app_slug", &self.app_slug)
			.field("base_url", &self.base_url.as_str())
			.field("directory_ttl", &self.directory_ttl)
			.finish()
	}
}

impl GithubAppConfig {
	/// Validate and normalize a base URL.
	///
	/// Requirements:
	/// - Must be a valid URL
	/// - Must use HTTPS scheme
	/// - Must have a host that is not loopback
	/// - The path always ends in `/` so relative joins keep `/api/v3`
	fn validate_and_normalize_base_url(raw: &str) -> Result<Url, GithubAppError> {
		let url = Url::parse(raw)
			.map_err(|e| GithubAppError::Config(format!("Invalid GitHub base URL '{raw}': {e}")))?;

		if url.scheme() != "https" {
			return Err(GithubAppError::Config(format!(
				"GitHub base URL must use https, got '{}'",
				url.scheme()
			)));
		}

		let host = url
			.host_str()
			.ok_or_else(|| GithubAppError::Config("GitHub base URL must include a host".to_string()))?;

		if host == "localhost" || host == "127.0.0.1" || host == "[::1]" {
			return Err(GithubAppError::Config(
				"GitHub base URL must not be localhost".to_string(),
			));
		}

		Ok(with_trailing_slash(url))
	}

	/// Create a new configuration with required fields.
	///
	/// Uses the default GitHub API URL (https://api.github.com).
	pub fn new(app_id: u64, private_key_pem: impl Into<String>) -> Self {
		Self {
			app_id,
			private_key_pem: Secret::new(private_key_pem.into()),
			webhook_secret: None,
			app_slug: DEFAULT_APP_SLUG.to_string(),
			base_url: with_trailing_slash(Url::parse(DEFAULT_BASE_URL).expect("default URL is valid")),
			directory_ttl: DEFAULT_DIRECTORY_TTL,
		}
	}

	/// Create configuration from environment variables.
	///
	/// Required:
	/// - `MARSHAL_GITHUB_APP_ID`
	/// - `MARSHAL_GITHUB_APP_PRIVATE_KEY` (or `_FILE`)
	///
	/// Optional:
	/// - `MARSHAL_GITHUB_APP_WEBHOOK_SECRET` (or `_FILE`)
	/// - `MARSHAL_GITHUB_APP_SLUG` (defaults to "marshal")
	/// - `MARSHAL_GITHUB_APP_BASE_URL` (defaults to api.github.com, must be HTTPS)
	/// - `MARSHAL_GITHUB_APP_DIRECTORY_TTL_SECS` (defaults to 48 hours)
	pub fn from_env() -> Result<Self, GithubAppError> {
		let app_id_str = env::var("MARSHAL_GITHUB_APP_ID")
			.map_err(|_| GithubAppError::Config("MARSHAL_GITHUB_APP_ID not set".to_string()))?;

		let app_id: u64 = app_id_str.parse().map_err(|_| {
			GithubAppError::Config(format!("Invalid MARSHAL_GITHUB_APP_ID: {app_id_str}"))
		})?;

		let private_key_pem = load_secret_env("MARSHAL_GITHUB_APP_PRIVATE_KEY")
			.map_err(|e| GithubAppError::Config(e.to_string()))?
			.ok_or_else(|| GithubAppError::Config("MARSHAL_GITHUB_APP_PRIVATE_KEY not set".to_string()))?;

		if private_key_pem.expose().is_empty() {
			return Err(GithubAppError::Config(
				"MARSHAL_GITHUB_APP_PRIVATE_KEY is empty".to_string(),
			));
		}

		let webhook_secret = load_secret_env("MARSHAL_GITHUB_APP_WEBHOOK_SECRET")
			.map_err(|e| GithubAppError::Config(e.to_string()))?;

		let app_slug =
			env::var("MARSHAL_GITHUB_APP_SLUG").unwrap_or_else(|_| DEFAULT_APP_SLUG.to_string());

		let base_url_raw =
			env::var("MARSHAL_GITHUB_APP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
		let base_url = Self::validate_and_normalize_base_url(&base_url_raw)?;

		let directory_ttl = match env::var("MARSHAL_GITHUB_APP_DIRECTORY_TTL_SECS") {
			Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| {
				GithubAppError::Config(format!(
					"Invalid MARSHAL_GITHUB_APP_DIRECTORY_TTL_SECS: {raw}"
				))
			})?),
			Err(_) => DEFAULT_DIRECTORY_TTL,
		};

		Ok(Self {
			app_id,
			private_key_pem,
			webhook_secret,
			app_slug,
			base_url,
			directory_ttl,
		})
	}

	/// Set a custom base URL (for GitHub Enterprise).
	///
	/// The URL must be HTTPS and have a valid host. A rejected URL is a
	/// [`GithubAppError::Config`]; the app JWT must never go to a host the
	/// operator did not ask for.
	pub fn with_base_url(mut self, url: impl AsRef<str>) -> Result<Self, GithubAppError> {
		self.base_url = Self::validate_and_normalize_base_url(url.as_ref())?;
		Ok(self)
	}

	/// Point the client at a local mock server. Skips the HTTPS check.
	#[cfg(any(test, feature = "testing"))]
	pub fn with_unchecked_base_url(mut self, url: &str) -> Self {
		self.base_url = with_trailing_slash(Url::parse(url).expect("mock server URL is valid"));
		self
	}

	/// Set the webhook secret.
	pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
		self.webhook_secret = Some(Secret::new(secret.into()));
		self
	}

	/// Set the app slug.
	pub fn with_app_slug(mut self, slug: impl Into<String>) -> Self {
		self.app_slug = slug.into();
		self
	}

	/// Set the directory TTL.
	pub fn with_directory_ttl(mut self, ttl: Duration) -> Self {
		self.directory_ttl = ttl;
		self
	}

	/// Get the GitHub App ID.
	pub fn app_id(&self) -> u64 {
		self.app_id
	}

	pub(crate) fn private_key_pem(&self) -> &str {
		self.private_key_pem.expose()
	}

	/// Get the webhook secret, if configured.
	pub fn webhook_secret(&self) -> Option<&str> {
		self.webhook_secret.as_ref().map(|s| s.expose().as_str())
	}

	/// Get the app slug.
	pub fn app_slug(&self) -> &str {
		&self.app_slug
	}

	/// Get the validated base URL.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn directory_ttl(&self) -> Duration {
		self.directory_ttl
	}

	/// Get the installation URL for users to install the app.
	pub fn installation_url(&self) -> String {
		if self.base_url.as_str().starts_with(DEFAULT_BASE_URL) {
			format!(
				"https://github.com/apps/{}/installations/new",
				self.app_slug
			)
		} else {
			let base = self
				.base_url
				.as_str()
				.trim_end_matches('/')
				.trim_end_matches("/api/v3");
			format!("{}/apps/{}/installations/new", base, self.app_slug)
		}
	}
}

fn with_trailing_slash(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	url
}

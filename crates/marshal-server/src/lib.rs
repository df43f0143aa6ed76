// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Webhook server that runs pull request checks as a GitHub App.

pub mod error;
pub mod pull_requests;
pub mod registry;
pub mod routes;

use std::sync::Arc;

use marshal_github_app::{GithubAppClient, GithubAppConfig, GithubAppError, InstallationDirectory};
use marshal_server_config::{ChecksConfig, GitHubAppConfig};
use tracing::{info, warn};

pub use error::ServerError;
pub use registry::{CheckContext, CheckRegistry, CiContext, CiHandler, PullRequestCheck};
pub use routes::circleci::CircleCiPayload;
pub use routes::create_router;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
	pub github: GithubAppClient,
	pub directory: Arc<InstallationDirectory>,
	pub registry: Arc<CheckRegistry>,
	pub checks: ChecksConfig,
}

impl AppState {
	pub fn new(
		github: GithubAppClient,
		directory: Arc<InstallationDirectory>,
		registry: CheckRegistry,
		checks: ChecksConfig,
	) -> Self {
		Self {
			github,
			directory,
			registry: Arc::new(registry),
			checks,
		}
	}
}

/// Load the directory once so startup logs show which repositories are
/// installed. A failure only warns; lookups refresh again on demand.
pub async fn warm_directory(directory: &InstallationDirectory) {
	match directory.refresh().await {
		Ok(()) => {
			let repositories = directory.known_repositories().await;
			info!(count = repositories.len(), ?repositories, "Installed repositories");
		}
		Err(e) => warn!(error = %e, "Initial installation directory refresh failed"),
	}
}

/// Client configuration from the server's `github_app` section.
pub fn github_app_config(section: &GitHubAppConfig) -> Result<GithubAppConfig, GithubAppError> {
	let mut config = GithubAppConfig::new(section.app_id, section.private_key_pem.expose().as_str())
		.with_directory_ttl(section.directory_ttl);
	if let Some(secret) = &section.webhook_secret {
		config = config.with_webhook_secret(secret.expose().as_str());
	}
	if let Some(slug) = &section.app_slug {
		config = config.with_app_slug(slug);
	}
	if let Some(base_url) = &section.base_url {
		config = config.with_base_url(base_url)?;
	}
	Ok(config)
}

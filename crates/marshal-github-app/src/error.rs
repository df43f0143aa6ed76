// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for the GitHub App client.

use thiserror::Error;

/// Errors raised while authenticating against or talking to GitHub.
///
/// Nothing in this crate retries. Callers surface these to their trigger
/// (webhook delivery, scheduled job) which owns the retry policy.
#[derive(Debug, Error)]
pub enum GithubAppError {
	/// Network-level error during HTTP communication.
	#[error("Network error: {0}")]
	Network(#[from] reqwest::Error),

	/// Request timed out.
	#[error("Request timed out")]
	Timeout,

	/// Missing or invalid app configuration.
	#[error("Configuration error: {0}")]
	Config(String),

	/// The private key could not sign an app JWT.
	#[error("JWT error: {0}")]
	Jwt(String),

	/// The access token endpoint rejected the app or the installation.
	///
	/// Carries GitHub's `message` verbatim when the response had one.
	#[error("{0}")]
	Authentication(String),

	/// Any other non-2xx response, with the raw body attached.
	#[error("GitHub API error: {status} - {body}")]
	Api { status: u16, body: String },

	/// Invalid or unparseable response.
	#[error("Invalid response from GitHub: {0}")]
	InvalidResponse(String),

	/// The repository is not covered by any installation of this app.
	#[error("Repository {repository} not recognized - should be one of:\n\n{}", format_known(.known))]
	RepositoryNotFound {
		repository: String,
		known: Vec<String>,
	},

	/// Webhook signature verification failed.
	#[error("Invalid webhook signature")]
	InvalidWebhookSignature,
}

pub(crate) const TOKEN_REQUEST_FAILED: &str = "token request failed";

fn format_known(known: &[String]) -> String {
	known
		.iter()
		.map(|name| format!("  - {name}"))
		.collect::<Vec<_>>()
		.join("\n")
}

impl GithubAppError {
	pub fn api_error(status: u16, body: impl Into<String>) -> Self {
		Self::Api {
			status,
			body: body.into(),
		}
	}

	pub fn repository_not_found(repository: impl Into<String>, known: Vec<String>) -> Self {
		Self::RepositoryNotFound {
			repository: repository.into(),
			known,
		}
	}

	/// True for the "app is not installed on this repository" case.
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::RepositoryNotFound { .. })
	}
}

pub(crate) fn map_send_error(e: reqwest::Error) -> GithubAppError {
	if e.is_timeout() {
		GithubAppError::Timeout
	} else {
		GithubAppError::Network(e)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_found_lists_known_repositories() {
		let err = GithubAppError::repository_not_found(
			"org/missing",
			vec!["org/one".to_string(), "org/two".to_string()],
		);
		assert!(err.is_not_found());
		assert_eq!(
			err.to_string(),
			"Repository org/missing not recognized - should be one of:\n\n  - org/one\n  - org/two"
		);
	}

	#[test]
	fn authentication_message_is_verbatim() {
		let err = GithubAppError::Authentication("Bad credentials".to_string());
		assert_eq!(err.to_string(), "Bad credentials");
		assert!(!err.is_not_found());
	}

	#[test]
	fn api_error_keeps_body() {
		let err = GithubAppError::api_error(422, "{\"message\":\"Validation Failed\"}");
		assert_eq!(
			err.to_string(),
			"GitHub API error: 422 - {\"message\":\"Validation Failed\"}"
		);
	}
}

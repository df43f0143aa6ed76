// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub App credentials and directory settings.

use std::time::Duration;

use marshal_common_config::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_DIRECTORY_TTL_SECS: u64 = 48 * 60 * 60;

/// Resolved GitHub App configuration. Absent entirely when no app id is set.
#[derive(Debug, Clone)]
pub struct GitHubAppConfig {
	pub app_id: u64,
	pub private_key_pem: SecretString,
	pub webhook_secret: Option<SecretString>,
	pub app_slug: Option<String>,
	pub base_url: Option<String>,
	/// How long a full installation listing is trusted.
	pub directory_ttl: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitHubAppConfigLayer {
	#[serde(default)]
	pub app_id: Option<u64>,
	#[serde(default)]
	pub private_key_pem: Option<SecretString>,
	#[serde(default)]
	pub webhook_secret: Option<SecretString>,
	#[serde(default)]
	pub app_slug: Option<String>,
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub directory_ttl_secs: Option<u64>,
}

impl GitHubAppConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.app_id.is_some() {
			self.app_id = other.app_id;
		}
		if other.private_key_pem.is_some() {
			self.private_key_pem = other.private_key_pem;
		}
		if other.webhook_secret.is_some() {
			self.webhook_secret = other.webhook_secret;
		}
		if other.app_slug.is_some() {
			self.app_slug = other.app_slug;
		}
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.directory_ttl_secs.is_some() {
			self.directory_ttl_secs = other.directory_ttl_secs;
		}
	}

	/// An app id and a private key come as a pair; one without the other is
	/// rejected rather than silently ignored.
	pub fn finalize(self) -> Result<Option<GitHubAppConfig>, ConfigError> {
		match (self.app_id, self.private_key_pem) {
			(None, None) => Ok(None),
			(Some(app_id), Some(private_key_pem)) => Ok(Some(GitHubAppConfig {
				app_id,
				private_key_pem,
				webhook_secret: self.webhook_secret,
				app_slug: self.app_slug,
				base_url: self.base_url,
				directory_ttl: Duration::from_secs(
					self.directory_ttl_secs.unwrap_or(DEFAULT_DIRECTORY_TTL_SECS),
				),
			})),
			(Some(_), None) => Err(ConfigError::Validation(
				"github_app.app_id is set but github_app.private_key_pem is missing".to_string(),
			)),
			(None, Some(_)) => Err(ConfigError::Validation(
				"github_app.private_key_pem is set but github_app.app_id is missing".to_string(),
			)),
		}
	}
}
